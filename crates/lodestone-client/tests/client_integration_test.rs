mod common;

use assert_matches::assert_matches;
use common::*;
use futures::future::join_all;
use lodestone_client::{query_status, Client};
use lodestone_common::{LodestoneError, ProtocolState, ProtocolVersion};
use lodestone_protocol::chat::ChatMessagePacket;
use lodestone_protocol::{ClientboundPacket, Compression, Encryption};
use rsa::pkcs8::EncodePublicKey;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey};
use std::sync::{Arc, Mutex};
use tokio::io::duplex;
use tokio_test::io::Builder;

const THRESHOLD: i32 = 256;

fn compressed() -> Compression {
    Compression::for_threshold(THRESHOLD)
}

/// Handshake and login start, then Set Compression and Login Success from the server.
fn scripted_login(builder: &mut Builder, username: &str) {
    let config = config(username);
    builder
        .write(&handshake(&config))
        .write(&login_start(username))
        .read(&plain(0x03, |buffer| buffer.write_varint(THRESHOLD)))
        .read(&login_success(compressed(), username));
}

#[tokio::test]
async fn test_login_keep_alive_teleport_and_disconnect() {
    let mut builder = Builder::new();
    scripted_login(&mut builder, "Steve");
    builder
        .read(&frame(compressed(), 0x1F, |buffer| buffer.write_i64(99)))
        .write(&frame(compressed(), 0x10, |buffer| buffer.write_i64(99)))
        .read(&frame(compressed(), 0x34, |buffer| {
            buffer.write_f64(8.5);
            buffer.write_f64(70.0);
            buffer.write_f64(-3.5);
            buffer.write_f32(90.0);
            buffer.write_f32(10.0);
            buffer.write_u8(0);
            buffer.write_varint(7);
        }))
        .write(&frame(compressed(), 0x00, |buffer| buffer.write_varint(7)))
        .write(&frame(compressed(), 0x13, |buffer| {
            buffer.write_f64(8.5);
            buffer.write_f64(70.0);
            buffer.write_f64(-3.5);
            buffer.write_f32(90.0);
            buffer.write_f32(10.0);
            buffer.write_bool(false);
        }))
        .read(&frame(compressed(), 0x0E, |buffer| {
            buffer.write_string(r#"{"text":"hello"}"#);
            buffer.write_i8(0);
            buffer.write_uuid(uuid::Uuid::nil());
        }))
        .read(&frame(compressed(), 0x19, |buffer| {
            buffer.write_string(r#"{"text":"bye"}"#)
        }));

    let mut client = Client::new(builder.build(), &config("Steve"));
    let messages = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&messages);
    let subscription = client.dispatcher().subscribe(move |packet| {
        if let ClientboundPacket::ChatMessage(chat) = packet {
            sink.lock().unwrap().push(chat.text());
        }
    });
    subscription.listen_to::<ChatMessagePacket>();

    client.login().await.unwrap();
    assert_matches!(client.run().await, Err(LodestoneError::ConnectionClosed));

    assert_eq!(client.session().state(), ProtocolState::Play);
    assert!(client.session().compression().is_enabled());
    assert_eq!(*messages.lock().unwrap(), vec!["hello".to_string()]);

    let pose = client.pose();
    assert_eq!((pose.x, pose.y, pose.z), (8.5, 70.0, -3.5));
    assert_eq!((pose.yaw, pose.pitch), (90.0, 10.0));
}

#[tokio::test]
async fn test_legacy_version_ids() {
    let mut config = config("Steve");
    config.server.protocol_version = ProtocolVersion::V1_13_2;

    let stream = Builder::new()
        .write(&handshake(&config))
        .write(&login_start("Steve"))
        .read(&plain(0x03, |buffer| buffer.write_varint(THRESHOLD)))
        .read(&frame(compressed(), 0x02, |buffer| {
            buffer.write_string("00000000-0000-0000-0000-000000000001");
            buffer.write_string("Steve");
        }))
        // Unload Chunk on 1.13.2, Keep Alive on 1.16.5
        .read(&frame(compressed(), 0x1F, |buffer| {
            buffer.write_i32(3);
            buffer.write_i32(-4);
        }))
        .read(&frame(compressed(), 0x21, |buffer| buffer.write_i64(8)))
        .write(&frame(compressed(), 0x0E, |buffer| buffer.write_i64(8)))
        .build();

    let mut client = Client::new(stream, &config);
    client.login().await.unwrap();
    assert_matches!(client.run().await, Err(LodestoneError::ConnectionClosed));
    assert_eq!(client.session().stats().unknown, 0);
    assert_eq!(client.session().stats().decode_failures, 0);
}

#[tokio::test]
async fn test_death_requests_respawn() {
    let mut builder = Builder::new();
    scripted_login(&mut builder, "Alex");
    builder
        .read(&frame(compressed(), 0x49, |buffer| {
            buffer.write_f32(0.0);
            buffer.write_varint(20);
            buffer.write_f32(5.0);
        }))
        .write(&frame(compressed(), 0x04, |buffer| buffer.write_varint(0)));

    let mut client = Client::new(builder.build(), &config("Alex"));
    client.login().await.unwrap();
    assert_matches!(client.run().await, Err(LodestoneError::ConnectionClosed));
}

#[tokio::test]
async fn test_unknown_packets_are_skipped() {
    let mut builder = Builder::new();
    scripted_login(&mut builder, "Steve");
    builder
        .read(&frame(compressed(), 0x7A, |buffer| buffer.write_bytes(&[1, 2, 3])))
        .read(&frame(compressed(), 0x1F, |buffer| buffer.write_i64(5)))
        .write(&frame(compressed(), 0x10, |buffer| buffer.write_i64(5)));

    let mut client = Client::new(builder.build(), &config("Steve"));
    client.login().await.unwrap();
    assert_matches!(client.run().await, Err(LodestoneError::ConnectionClosed));
    assert_eq!(client.session().stats().unknown, 1);
}

#[tokio::test]
async fn test_eof_after_login() {
    let mut builder = Builder::new();
    scripted_login(&mut builder, "Steve");

    let mut client = Client::new(builder.build(), &config("Steve"));
    client.login().await.unwrap();
    assert_matches!(client.run().await, Err(LodestoneError::ConnectionClosed));
    assert_eq!(client.session().state(), ProtocolState::Play);
}

#[tokio::test]
async fn test_login_disconnect() {
    let config = config("Banned");
    let stream = Builder::new()
        .write(&handshake(&config))
        .write(&login_start("Banned"))
        .read(&plain(0x00, |buffer| {
            buffer.write_string(r#"{"text":"You are banned"}"#)
        }))
        .build();

    let mut client = Client::new(stream, &config);
    client.login().await.unwrap();
    assert_matches!(client.run().await, Err(LodestoneError::ConnectionClosed));
    assert_eq!(client.session().state(), ProtocolState::Login);
}

#[tokio::test]
async fn test_concurrent_clients() {
    let sessions = (0..5).map(|i| async move {
        let username = format!("Bot{i}");
        let mut builder = Builder::new();
        scripted_login(&mut builder, &username);
        builder
            .read(&frame(compressed(), 0x1F, |buffer| buffer.write_i64(i)))
            .write(&frame(compressed(), 0x10, |buffer| buffer.write_i64(i)));

        let mut client = Client::new(builder.build(), &config(&username));
        client.login().await?;
        client.run().await
    });

    for result in join_all(sessions).await {
        assert_matches!(result, Err(LodestoneError::ConnectionClosed));
    }
}

#[tokio::test]
async fn test_encrypted_login() {
    let (client_stream, server_stream) = duplex(64 * 1024);
    let config = config("Steve");

    let server = async move {
        let mut server = ServerSide::new(server_stream);
        let private_key = RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let public_der = private_key
            .to_public_key()
            .to_public_key_der()
            .unwrap()
            .as_bytes()
            .to_vec();
        let verify_token = vec![9, 8, 7, 6];

        server.read_payload().await; // handshake
        let mut login_start = server.read_payload().await;
        assert_eq!(login_start.read_varint().unwrap(), 0x00);
        assert_eq!(login_start.read_string().unwrap(), "Steve");

        server
            .send(0x01, |buffer| {
                buffer.write_string("");
                buffer.write_byte_array(&public_der);
                buffer.write_byte_array(&verify_token);
            })
            .await;

        let mut response = server.read_payload().await;
        assert_eq!(response.read_varint().unwrap(), 0x01);
        let secret = private_key
            .decrypt(Pkcs1v15Encrypt, &response.read_byte_array().unwrap())
            .unwrap();
        let token = private_key
            .decrypt(Pkcs1v15Encrypt, &response.read_byte_array().unwrap())
            .unwrap();
        assert_eq!(token, verify_token);
        assert_eq!(secret.len(), 16);

        server.encryption = Encryption::aes(&secret).unwrap();
        server.send(0x03, |buffer| buffer.write_varint(THRESHOLD)).await;
        server.compression = compressed();
        server
            .send(0x02, |buffer| {
                buffer.write_uuid(uuid::Uuid::from_u128(1));
                buffer.write_string("Steve");
            })
            .await;
        server.send(0x1F, |buffer| buffer.write_i64(0x1234)).await;

        let mut keep_alive = server.read_payload().await;
        assert_eq!(keep_alive.read_varint().unwrap(), 0x10);
        assert_eq!(keep_alive.read_i64().unwrap(), 0x1234);

        server
            .send(0x19, |buffer| buffer.write_string(r#"{"text":"done"}"#))
            .await;
    };

    let mut client = Client::new(client_stream, &config);
    let run = async {
        client.login().await?;
        client.run().await
    };

    let (result, ()) = tokio::join!(run, server);
    assert_matches!(result, Err(LodestoneError::ConnectionClosed));
    assert!(client.session().is_encrypted());
    assert_eq!(client.session().state(), ProtocolState::Play);
}

#[tokio::test]
async fn test_query_status() {
    let (client_stream, server_stream) = duplex(16 * 1024);
    let config = config("Steve");

    let server = tokio::spawn(async move {
        let mut server = ServerSide::new(server_stream);
        let mut handshake = server.read_payload().await;
        assert_eq!(handshake.read_varint().unwrap(), 0x00);
        handshake.read_varint().unwrap();
        handshake.read_string().unwrap();
        handshake.read_u16().unwrap();
        assert_eq!(handshake.read_varint().unwrap(), 1);

        let mut request = server.read_payload().await;
        assert_eq!(request.read_varint().unwrap(), 0x00);
        server
            .send(0x00, |buffer| {
                buffer.write_string(
                    r#"{"version":{"name":"1.16.5","protocol":754},"players":{"max":20,"online":3},"description":{"text":"A server"}}"#,
                )
            })
            .await;

        let mut ping = server.read_payload().await;
        assert_eq!(ping.read_varint().unwrap(), 0x01);
        let payload = ping.read_i64().unwrap();
        server.send(0x01, |buffer| buffer.write_i64(payload)).await;
    });

    let (status, _rtt) = query_status(client_stream, &config).await.unwrap();
    server.await.unwrap();

    assert_eq!(status.version.protocol, 754);
    assert_eq!(status.players.map(|players| players.online), Some(3));
}

#[tokio::test]
async fn test_query_status_rejects_unknown_packet() {
    let (client_stream, server_stream) = duplex(16 * 1024);
    let config = config("Steve");

    let server = tokio::spawn(async move {
        let mut server = ServerSide::new(server_stream);
        server.read_payload().await;
        server.read_payload().await;
        server.send(0x05, |buffer| buffer.write_i64(1)).await;
        server
    });

    let result = query_status(client_stream, &config).await;
    let _server = server.await.unwrap();
    assert_matches!(
        result,
        Err(LodestoneError::UnknownPacket {
            state: ProtocolState::Status,
            id: 0x05
        })
    );
}
