use std::{error::Error, fmt};

/// Features of a flattened 28x28 image.
pub const FEATURES: usize = 784;
/// Width of a matrix row, the label lives in the trailing column.
pub const WIDTH: usize = FEATURES + 1;
/// The raw intensity every feature is divided by.
pub const PIXEL_MAX: f32 = 255.0;
pub const IMAGE_SIDE: u32 = 28;

/// Where the fields of a raw row are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    /// `label,pixel0,...,pixel783`, the training format.
    Labeled,
    /// `pixel0,...,pixel783`, the inference format.
    Unlabeled,
}

/// One normalized row: 784 features in `[0, 1]` and its label, when known.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    features: Box<[f32]>,
    label: Option<u8>,
}

impl Sample {
    pub fn features(&self) -> &[f32] {
        &self.features
    }

    pub fn label(&self) -> Option<u8> {
        self.label
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseRowErr {
    MissingField { index: usize },
    InvalidNumber { index: usize, value: String },
}

impl fmt::Display for ParseRowErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseRowErr::MissingField { index } => {
                write!(f, "field {index} is missing, rows carry {FEATURES} features")
            }
            ParseRowErr::InvalidNumber { index, value } => {
                write!(f, "field {index} is not a number: {value:?}")
            }
        }
    }
}

impl Error for ParseRowErr {}

impl RowLayout {
    /// Normalizes a comma separated row.
    pub fn normalize(self, raw: &str) -> Result<Sample, ParseRowErr> {
        self.normalize_fields(raw.trim_end_matches(['\r', '\n']).split(','))
    }

    /// Normalizes an already tokenized row.
    ///
    /// Exactly [`FEATURES`] feature fields are consumed, anything after them is ignored.
    pub fn normalize_fields<'a, I>(self, fields: I) -> Result<Sample, ParseRowErr>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut fields = fields.into_iter().enumerate();

        let label = match self {
            RowLayout::Labeled => {
                let (index, value) = fields.next().ok_or(ParseRowErr::MissingField { index: 0 })?;
                let label = value
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| ParseRowErr::InvalidNumber {
                        index,
                        value: value.to_string(),
                    })?;
                Some(label)
            }
            RowLayout::Unlabeled => None,
        };

        let first = match self {
            RowLayout::Labeled => 1,
            RowLayout::Unlabeled => 0,
        };

        let mut features = Vec::with_capacity(FEATURES);
        for expected in first..first + FEATURES {
            let (index, value) = fields
                .next()
                .ok_or(ParseRowErr::MissingField { index: expected })?;
            let pixel = value
                .trim()
                .parse::<f32>()
                .map_err(|_| ParseRowErr::InvalidNumber {
                    index,
                    value: value.to_string(),
                })?;
            features.push(pixel / PIXEL_MAX);
        }

        Ok(Sample {
            features: features.into_boxed_slice(),
            label,
        })
    }
}
