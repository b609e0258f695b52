use comms::{
    Deserialize, Serialize,
    msg::{Command, Msg, Payload},
};
use tokio::io;

struct MyStr<'a>(&'a str);

impl<'a> Serialize<'a> for MyStr<'_> {
    fn serialize(&'a self, _buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        Some(self.0.as_bytes())
    }
}

impl<'a> Deserialize<'a> for MyStr<'a> {
    fn deserialize(buf: &'a mut [u8]) -> std::io::Result<Self> {
        let s = std::str::from_utf8(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(Self(s))
    }
}

#[tokio::test]
async fn send_recv_custom_type() {
    const SIZE: usize = 128;

    let msg = MyStr("Hello, world!");

    let (one, two) = io::duplex(SIZE);
    let (rx, tx) = io::split(one);
    let (_, mut tx) = comms::channel(rx, tx);

    tx.send(&msg).await.unwrap();

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u32> = Vec::new();
    let s: MyStr = rx.recv_into(&mut buf).await.unwrap();

    assert_eq!(msg.0, s.0);
}

#[tokio::test]
async fn rows_larger_than_the_pipe_arrive_intact() {
    const SIZE: usize = 64;

    let (one, two) = io::duplex(SIZE);
    let (_, tx) = io::split(one);
    let (rx, _) = io::split(two);
    let (_, mut tx) = comms::channel(io::empty(), tx);
    let (mut rx, _) = comms::channel(rx, io::sink());

    let rows: Vec<f32> = (0..1000).map(|i| i as f32 / 255.0).collect();
    let expected = rows.clone();

    let send = async move {
        tx.send(&Msg::Data(Payload::Rows(&rows))).await?;
        tx.send(&Msg::Control(Command::Disconnect)).await
    };

    let recv = async move {
        let mut buf: Vec<f32> = Vec::new();
        let got = match rx.recv_into(&mut buf).await? {
            Msg::Data(Payload::Rows(got)) => got.to_vec(),
            other => panic!("unexpected msg: {other:?}"),
        };

        let mut buf: Vec<u32> = Vec::new();
        let tail: Msg = rx.recv_into(&mut buf).await?;
        assert!(matches!(tail, Msg::Control(Command::Disconnect)));
        std::io::Result::Ok(got)
    };

    let (sent, got) = tokio::join!(send, recv);
    sent.unwrap();
    assert_eq!(got.unwrap(), expected);
}

#[tokio::test]
async fn closed_stream_is_an_error() {
    let (one, two) = io::duplex(16);
    drop(one);

    let (rx, tx) = io::split(two);
    let (mut rx, _) = comms::channel(rx, tx);

    let mut buf: Vec<u32> = Vec::new();
    let res: std::io::Result<Msg> = rx.recv_into(&mut buf).await;
    assert_eq!(res.unwrap_err().kind(), std::io::ErrorKind::UnexpectedEof);
}

#[tokio::test]
async fn oversized_frames_are_rejected() {
    let (one, two) = io::duplex(1024);
    let (_, mut tx) = comms::channel(io::empty(), one);
    let (rx, _) = comms::channel(two, io::sink());
    let mut rx = rx.with_max_len(16);

    let rows = [0.5f32; 8];
    tx.send(&Msg::Data(Payload::Rows(&rows))).await.unwrap();

    let mut buf: Vec<u32> = Vec::new();
    let res: std::io::Result<Msg> = rx.recv_into(&mut buf).await;
    assert_eq!(res.unwrap_err().kind(), std::io::ErrorKind::InvalidData);
}
