use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use redlite::codec::ProtocolError;
use redlite::connection::Connection;
use redlite::frame::Frame;

/// Returns the client side of a fresh TCP connection and the server side wrapped in a
/// `Connection`.
async fn create_tcp_connection() -> Result<(TcpStream, Connection), std::io::Error> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let local_addr = listener.local_addr()?;

    let client = TcpStream::connect(local_addr).await?;
    let (socket, client_address) = listener.accept().await?;

    Ok((client, Connection::new(socket, client_address)))
}

#[tokio::test]
async fn test_parse_array() {
    let (mut client, mut connection) = create_tcp_connection().await.unwrap();

    client
        .write_all(b"*3\r\n$3\r\nSET\r\n$5\r\nmykey\r\n$7\r\nmyvalue\r\n")
        .await
        .unwrap();

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Array(vec![
        Frame::Bulk(Bytes::from("SET")),
        Frame::Bulk(Bytes::from("mykey")),
        Frame::Bulk(Bytes::from("myvalue")),
    ]));

    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_parse_binary_value() {
    let (mut client, mut connection) = create_tcp_connection().await.unwrap();

    client
        .write_all(b"*2\r\n$4\r\nECHO\r\n$6\r\n\x00\r\n\xff\r\n\r\n")
        .await
        .unwrap();

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Array(vec![
        Frame::Bulk(Bytes::from("ECHO")),
        Frame::Bulk(Bytes::from_static(b"\x00\r\n\xff\r\n")),
    ]));

    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_parse_multiple_commands_sequentially() {
    let (mut client, mut connection) = create_tcp_connection().await.unwrap();

    let array_1 = b"*3\r\n$3\r\nSET\r\n$7\r\nmykey_1\r\n$9\r\nmyvalue_1\r\n";
    let array_2 = b"*2\r\n$3\r\nGET\r\n$7\r\nmykey_1\r\n";
    let array_3 = b"*1\r\n$4\r\nPING\r\n";

    let mut pipeline = Vec::new();
    pipeline.extend_from_slice(array_1);
    pipeline.extend_from_slice(array_2);
    pipeline.extend_from_slice(array_3);
    client.write_all(&pipeline).await.unwrap();

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Array(vec![
        Frame::Bulk(Bytes::from("SET")),
        Frame::Bulk(Bytes::from("mykey_1")),
        Frame::Bulk(Bytes::from("myvalue_1")),
    ]));
    assert_eq!(actual, expected);

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Array(vec![
        Frame::Bulk(Bytes::from("GET")),
        Frame::Bulk(Bytes::from("mykey_1")),
    ]));
    assert_eq!(actual, expected);

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Array(vec![Frame::Bulk(Bytes::from("PING"))]));
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_parse_incomplete_frame() {
    let (mut client, mut connection) = create_tcp_connection().await.unwrap();

    // Command split into three parts to simulate partial/incomplete data sending.
    // "*3\r\n$3\r\nSET\r\n$5\r\nmykey\r\n$7\r\nmyvalue\r\n";
    let part1 = b"*3\r\n$3\r\nSE";
    let part2 = b"T\r\n$5\r\nmyke";
    let part3 = b"y\r\n$7\r\nmyvalue\r\n";

    tokio::spawn(async move {
        for part in [&part1[..], &part2[..], &part3[..]] {
            client.write_all(part).await.unwrap();
            // Simulate a delay in sending/receiving the data.
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    });

    let actual = connection.read_frame().await.unwrap();
    let expected = Some(Frame::Array(vec![
        Frame::Bulk(Bytes::from("SET")),
        Frame::Bulk(Bytes::from("mykey")),
        Frame::Bulk(Bytes::from("myvalue")),
    ]));
    assert_eq!(actual, expected);
}

#[tokio::test]
async fn test_client_closes_connection() {
    let (client, mut connection) = create_tcp_connection().await.unwrap();

    drop(client);

    assert_eq!(connection.read_frame().await.unwrap(), None);
}

#[tokio::test]
async fn test_malformed_request() {
    let (mut client, mut connection) = create_tcp_connection().await.unwrap();

    client.write_all(b"PING\r\n").await.unwrap();

    let err = connection.read_frame().await.unwrap_err();
    let err = err.downcast::<ProtocolError>().unwrap();

    assert_eq!(
        *err,
        ProtocolError::UnexpectedByte {
            expected: '*',
            actual: 'P'
        }
    );
}

#[tokio::test]
async fn test_write_frame() {
    let (mut client, mut connection) = create_tcp_connection().await.unwrap();

    connection
        .write_frame(Frame::Array(vec![
            Frame::Bulk(Bytes::from("dir")),
            Frame::Null,
        ]))
        .await
        .unwrap();

    let expected = b"*2\r\n$3\r\ndir\r\n$-1\r\n";
    let mut actual = vec![0; expected.len()];
    client.read_exact(&mut actual).await.unwrap();

    assert_eq!(actual, expected);
}
