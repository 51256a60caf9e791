use super::*;
use bytes::Bytes;
use game_server::auth::sign_envelope;
use game_server::{ClientId, ServerConfig};
use polaris_protocol::MessageWriter;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

const PEER: &str = "127.0.0.1:42069";

async fn registered_builder() -> ServerBuilder {
    let mut builder = ServerBuilder::new(ServerConfig {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        ..Default::default()
    });
    let mut plugin = create_plugin().unwrap();
    plugin.register(&mut builder).await.unwrap();
    builder
}

fn signed_test_packet(message: &str) -> Bytes {
    let mut body = MessageWriter::new();
    body.write_byte(0x01).write_u16_be(0x08).start_message(TEST_PACKET_OPCODE);
    TestPacket::new(message).serialize(&mut body);
    body.end_message().unwrap();
    let body = body.finish().unwrap();

    let cody = &sample_users()[0];
    let client_id: ClientId = cody.client_id.parse().unwrap();
    sign_envelope(0x69, &client_id, &cody.token, &body).unwrap()
}

#[tokio::test]
async fn test_registers_packets_on_every_layer() {
    let builder = registered_builder().await;

    assert!(builder.packets().layer(PacketLayer::Root).contains(TEST_PACKET_OPCODE));
    assert!(builder.packets().layer(PacketLayer::GameData).contains(TEST_GAME_DATA_OPCODE));
    assert!(builder.packets().layer(PacketLayer::Rpc).contains(TEST_RPC_OPCODE));
    assert!(builder.has_inbound_transformer());
}

#[tokio::test]
async fn test_registering_twice_fails() {
    let mut builder = registered_builder().await;
    let mut again = ExamplePlugin::new();

    assert!(again.register(&mut builder).await.is_err());
}

#[tokio::test]
async fn test_signed_packet_is_dispatched() {
    let builder = registered_builder().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    builder
        .events()
        .on_core("custom_packet", move |event: CustomPacketEvent| {
            log.lock().unwrap().push((event.layer, event.opcode));
            Ok(())
        })
        .await
        .unwrap();
    let server = builder.build();

    let peer: SocketAddr = PEER.parse().unwrap();
    let connection = server
        .handle_datagram(peer, signed_test_packet("this is a signed message"))
        .await
        .unwrap();

    assert!(!connection.is_disconnected());
    assert_eq!(*seen.lock().unwrap(), vec![(PacketLayer::Root, TEST_PACKET_OPCODE)]);
}

#[tokio::test]
async fn test_unsigned_packet_passes_through() {
    let server = registered_builder().await.build();

    let mut writer = MessageWriter::new();
    writer.write_byte(0x01).write_u16_be(0x07).start_message(TEST_PACKET_OPCODE);
    TestPacket::new("hello world").serialize(&mut writer);
    writer.end_message().unwrap();

    let peer: SocketAddr = PEER.parse().unwrap();
    let connection = server.handle_datagram(peer, writer.finish().unwrap()).await.unwrap();
    assert!(!connection.is_disconnected());
}

#[test]
fn test_random_lobby_join() {
    let lobbies = LobbyTable::new();
    assert_eq!(RandomLobbyJoin.resolve(RANDOM_LOBBY, &lobbies), None);

    let open: LobbyCode = "OPEN".parse().unwrap();
    let private: LobbyCode = "PRIV".parse().unwrap();
    lobbies.create(open, true, 10);
    lobbies.create(private, false, 10);

    assert_eq!(RandomLobbyJoin.resolve(RANDOM_LOBBY, &lobbies), Some(open));
    assert_eq!(RandomLobbyJoin.resolve("priv", &lobbies), Some(private));
    assert_eq!(RandomLobbyJoin.resolve("NONE", &lobbies), None);
}

#[test]
fn test_sample_users_are_valid() {
    let users = sample_users();
    assert_eq!(users.len(), 3);
    assert!(AuthenticatingTransformer::from_config(&game_server::AuthConfig {
        users,
        ..Default::default()
    })
    .is_ok());
}
