use std::{borrow::Cow, io};

use crate::{
    Deserialize, Serialize,
    specs::{training::TrainingSpec, worker::WorkerSpec},
};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();
const OFFSET_SIZE: usize = size_of::<u32>();

const ERR_KIND: Header = 0;
const CONTROL_KIND: Header = 1;
const ROWS_KIND: Header = 2;
const LABELS_KIND: Header = 3;

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug)]
pub enum Payload<'a> {
    /// Row major dataset rows, `rows * width` values.
    Rows(&'a [f32]),
    /// A worker's predictions, `offset` is the global index of the first one.
    Labels { offset: u32, labels: &'a [u32] },
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Welcome(WorkerSpec),
    Training(TrainingSpec),
    RowCount(usize),
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    fn buf_is_too_small<T>(size: usize, needed: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {needed} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {kind}"),
        ))
    }

    fn misaligned<T>(err: bytemuck::PodCastError) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received a numeric payload that can't be viewed in place: {err:?}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_KIND.to_be_bytes());
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_KIND.to_be_bytes());
                serde_json::to_writer(&mut *buf, cmd)
                    .expect("derived command serialization into a vec never fails");
                None
            }
            Msg::Data(Payload::Rows(rows)) => {
                buf.extend_from_slice(&ROWS_KIND.to_be_bytes());
                Some(bytemuck::cast_slice(rows))
            }
            Msg::Data(Payload::Labels { offset, labels }) => {
                buf.extend_from_slice(&LABELS_KIND.to_be_bytes());
                buf.extend_from_slice(&offset.to_be_bytes());
                Some(bytemuck::cast_slice(labels))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a mut [u8]) -> io::Result<Self> {
        let buf: &'a [u8] = buf;
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len(), HEADER_SIZE);
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);
        let mut kind_bytes = [0; HEADER_SIZE];
        kind_bytes.copy_from_slice(kind_buf);

        match Header::from_be_bytes(kind_bytes) {
            ERR_KIND => {
                let string = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL_KIND => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            ROWS_KIND => match bytemuck::try_cast_slice(rest) {
                Ok(rows) => Ok(Self::Data(Payload::Rows(rows))),
                Err(err) => Self::misaligned(err),
            },
            LABELS_KIND => {
                if rest.len() < OFFSET_SIZE {
                    return Self::buf_is_too_small(rest.len() + HEADER_SIZE, HEADER_SIZE + OFFSET_SIZE);
                }

                let (offset_buf, rest) = rest.split_at(OFFSET_SIZE);
                let mut offset_bytes = [0; OFFSET_SIZE];
                offset_bytes.copy_from_slice(offset_buf);
                let offset = u32::from_be_bytes(offset_bytes);

                match bytemuck::try_cast_slice(rest) {
                    Ok(labels) => Ok(Self::Data(Payload::Labels { offset, labels })),
                    Err(err) => Self::misaligned(err),
                }
            }
            kind => Self::invalid_kind(kind),
        }
    }
}
