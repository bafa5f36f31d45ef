//! End-to-end exchanges against a scripted peer
//!
//! The transport is built over an in-memory duplex stream; a peer task plays
//! the slave side with precomputed frames, byte-for-byte. CRC trailers were
//! verified against the reference CRC-16/MODBUS algorithm.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::time::timeout;

use modbus_rtu::{ExceptionCode, ModbusClient, ModbusError, RtuTransport};

const READ03_REQ: [u8; 8] = [0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B];
const READ03_RESP: [u8; 9] = [0x01, 0x03, 0x04, 0x00, 0x0A, 0x00, 0x0B, 0x9B, 0xF6];

fn client_pair(response_timeout: Duration) -> (ModbusClient, DuplexStream) {
    let (master, peer) = tokio::io::duplex(512);
    let transport = RtuTransport::from_stream(master, response_timeout);
    (ModbusClient::from_transport(transport), peer)
}

/// Read one request off the wire, check it, answer with a canned frame.
async fn expect_exchange(peer: &mut DuplexStream, expected: &[u8], response: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    peer.read_exact(&mut buf).await.expect("peer read");
    assert_eq!(buf, expected, "unexpected request on the wire");
    if !response.is_empty() {
        peer.write_all(response).await.expect("peer write");
    }
}

#[tokio::test]
async fn read_holding_registers_decodes_register_list() {
    let (client, mut peer) = client_pair(Duration::from_secs(1));
    let peer_task = tokio::spawn(async move {
        expect_exchange(&mut peer, &READ03_REQ, &READ03_RESP).await;
    });

    let values = client.read_holding_registers(1, 0, 2).await.unwrap();
    assert_eq!(values, [0x000A, 0x000B]);
    peer_task.await.unwrap();

    let stats = client.stats();
    assert_eq!(stats.requests_sent, 1);
    assert_eq!(stats.responses_received, 1);
}

#[tokio::test]
async fn read_input_registers_decodes_register_list() {
    let (client, mut peer) = client_pair(Duration::from_secs(1));
    let peer_task = tokio::spawn(async move {
        expect_exchange(
            &mut peer,
            &[0x01, 0x04, 0x00, 0x00, 0x00, 0x01, 0x31, 0xCA],
            &[0x01, 0x04, 0x02, 0x00, 0x2A, 0x38, 0xEF],
        )
        .await;
    });

    let values = client.read_input_registers(1, 0, 1).await.unwrap();
    assert_eq!(values, [0x002A]);
    peer_task.await.unwrap();
}

#[tokio::test]
async fn write_register_builds_address_value_payload() {
    let (client, mut peer) = client_pair(Duration::from_secs(1));
    let peer_task = tokio::spawn(async move {
        // Payload must be exactly address ‖ value, big-endian.
        let echo = [0x01, 0x06, 0x00, 0x01, 0x00, 0x02, 0x59, 0xCB];
        expect_exchange(&mut peer, &echo, &echo).await;
    });

    client.write_register(1, 0x0001, 0x0002).await.unwrap();
    peer_task.await.unwrap();
}

#[tokio::test]
async fn write_registers_builds_block_payload() {
    let (client, mut peer) = client_pair(Duration::from_secs(1));
    let peer_task = tokio::spawn(async move {
        expect_exchange(
            &mut peer,
            // address ‖ count ‖ values, no byte-count field
            &[0x01, 0x10, 0x00, 0x01, 0x00, 0x02, 0x00, 0x0A, 0x01, 0x02, 0x25, 0x51],
            &[0x01, 0x10, 0x00, 0x01, 0x00, 0x02, 0x10, 0x08],
        )
        .await;
    });

    client
        .write_registers(1, 0x0001, &[0x000A, 0x0102])
        .await
        .unwrap();
    peer_task.await.unwrap();
}

#[tokio::test]
async fn read_write_registers_round_trip() {
    let (client, mut peer) = client_pair(Duration::from_secs(1));
    let peer_task = tokio::spawn(async move {
        expect_exchange(
            &mut peer,
            &[
                0x01, 0x17, 0x00, 0x00, 0x00, 0x02, 0x00, 0x10, 0x00, 0x01, 0x00, 0xFF, 0x24,
                0xF6,
            ],
            &[0x01, 0x17, 0x04, 0x00, 0x0A, 0x00, 0x0B, 0x98, 0xE2],
        )
        .await;
    });

    let values = client
        .read_write_registers(1, 0, 2, 0x0010, &[0x00FF])
        .await
        .unwrap();
    assert_eq!(values, [0x000A, 0x000B]);
    peer_task.await.unwrap();
}

#[tokio::test]
async fn raw_request_strips_byte_count_prefix() {
    let (client, mut peer) = client_pair(Duration::from_secs(1));
    let peer_task = tokio::spawn(async move {
        expect_exchange(&mut peer, &READ03_REQ, &READ03_RESP).await;
    });

    let data = client
        .raw_request(1, 0x03, vec![0x00, 0x00, 0x00, 0x02])
        .await
        .unwrap()
        .expect("read responses carry a payload");
    assert_eq!(&data[..], [0x00, 0x0A, 0x00, 0x0B]);
    peer_task.await.unwrap();
}

#[tokio::test]
async fn device_exception_surfaces_code_and_text() {
    let (client, mut peer) = client_pair(Duration::from_secs(1));
    let peer_task = tokio::spawn(async move {
        expect_exchange(
            &mut peer,
            &READ03_REQ,
            // Function 0x83: exception reply to FC03, code 2.
            &[0x01, 0x83, 0x02, 0xC0, 0xF1],
        )
        .await;
    });

    let err = client.read_holding_registers(1, 0, 2).await.unwrap_err();
    match err {
        ModbusError::Exception { function, code } => {
            assert_eq!(function, 0x03);
            assert_eq!(code, ExceptionCode::IllegalDataAddress);
            assert_eq!(code.to_string(), "illegal data address");
        }
        other => panic!("expected device exception, got {other:?}"),
    }
    peer_task.await.unwrap();
}

#[tokio::test]
async fn response_from_wrong_slave_is_a_mismatch() {
    let (client, mut peer) = client_pair(Duration::from_secs(1));
    let peer_task = tokio::spawn(async move {
        expect_exchange(
            &mut peer,
            &READ03_REQ,
            &[0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00, 0xC9, 0x33],
        )
        .await;
    });

    let err = client.read_holding_registers(1, 0, 2).await.unwrap_err();
    assert!(matches!(err, ModbusError::Mismatch { .. }));
    peer_task.await.unwrap();
}

#[tokio::test]
async fn corrupt_frame_is_absorbed_and_wait_continues() {
    let (client, mut peer) = client_pair(Duration::from_secs(1));
    let peer_task = tokio::spawn(async move {
        let mut buf = [0u8; 8];
        peer.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, READ03_REQ);
        // Line noise first: a complete-looking frame with a bad trailer.
        // The reader must drop it without failing the pending request.
        peer.write_all(&[0x01, 0x03, 0x02, 0x00, 0x00, 0xFF, 0xFF])
            .await
            .unwrap();
        peer.write_all(&READ03_RESP).await.unwrap();
    });

    let values = client.read_holding_registers(1, 0, 2).await.unwrap();
    assert_eq!(values, [0x000A, 0x000B]);
    peer_task.await.unwrap();

    let stats = client.stats();
    assert_eq!(stats.frame_errors, 1);
    assert_eq!(stats.responses_received, 1);
}

#[tokio::test]
async fn broadcast_write_returns_without_response() {
    let (client, mut peer) = client_pair(Duration::from_secs(5));

    // No peer answer is ever written; the call must still return promptly.
    let result = timeout(
        Duration::from_millis(500),
        client.write_register(0, 0x0005, 0x0001),
    )
    .await
    .expect("broadcast send must not wait for a response");
    result.unwrap();

    let mut buf = [0u8; 8];
    peer.read_exact(&mut buf).await.unwrap();
    assert_eq!(buf, [0x00, 0x06, 0x00, 0x05, 0x00, 0x01, 0x59, 0xDA]);
}

#[tokio::test]
async fn concurrent_sends_never_interleave() {
    let (client, mut peer) = client_pair(Duration::from_secs(1));
    let client = Arc::new(client);

    // The peer speaks strictly one exchange at a time; interleaved request
    // bytes would desynchronize it and fail the frame comparison.
    let peer_task = tokio::spawn(async move {
        for _ in 0..2 {
            expect_exchange(&mut peer, &READ03_REQ, &READ03_RESP).await;
        }
    });

    let a = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.read_holding_registers(1, 0, 2).await })
    };
    let b = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.read_holding_registers(1, 0, 2).await })
    };

    assert_eq!(a.await.unwrap().unwrap(), [0x000A, 0x000B]);
    assert_eq!(b.await.unwrap().unwrap(), [0x000A, 0x000B]);
    peer_task.await.unwrap();
}

#[tokio::test]
async fn release_unblocks_even_without_traffic() {
    let (client, _peer) = client_pair(Duration::from_secs(5));

    timeout(Duration::from_secs(1), client.release())
        .await
        .expect("release must not hang")
        .unwrap();
}

#[tokio::test]
async fn peer_hangup_ends_the_transport() {
    let (client, peer) = client_pair(Duration::from_millis(200));

    // Slave side goes away; the reader observes the terminal error and
    // exits, and subsequent sends fail instead of hanging forever.
    drop(peer);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = client.read_holding_registers(1, 0, 2).await.unwrap_err();
    assert!(matches!(
        err,
        ModbusError::Io { .. } | ModbusError::Timeout { .. }
    ));

    client.release().await.unwrap();
}
