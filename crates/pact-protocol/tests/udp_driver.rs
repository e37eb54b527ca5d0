//! Full-stack run over real UDP sockets on the loopback interface.

use std::sync::Arc;
use std::time::Duration;

use pact_crypto::{Keypair, Signer};
use pact_proofs::Party;
use pact_protocol::{run_participant, Decision, FloodingConfig, LadderMachine};
use pact_transport::{UdpTransport, DEFAULT_MAX_FRAME_BYTES};
use tokio::net::UdpSocket;

#[tokio::test]
async fn udp_loopback_run_reaches_mutual_attack() -> anyhow::Result<()> {
    let a_socket = UdpSocket::bind("127.0.0.1:0").await?;
    let b_socket = UdpSocket::bind("127.0.0.1:0").await?;
    let a_addr = a_socket.local_addr()?;
    let b_addr = b_socket.local_addr()?;

    let alice_transport = UdpTransport::from_socket(a_socket, b_addr);
    let bob_transport = UdpTransport::from_socket(b_socket, a_addr);

    let alice_keys: Arc<dyn Signer> = Arc::new(Keypair::from_seed(&[1u8; 32]));
    let bob_keys: Arc<dyn Signer> = Arc::new(Keypair::from_seed(&[2u8; 32]));
    let mut alice = LadderMachine::new(
        Party::Alice,
        alice_keys.clone(),
        bob_keys.public_key(),
        b"attack at dawn".to_vec(),
    );
    let mut bob = LadderMachine::new(
        Party::Bob,
        bob_keys,
        alice_keys.public_key(),
        b"attack at dawn".to_vec(),
    );

    let config = FloodingConfig {
        flood_interval: Duration::from_millis(10),
        deadline: Duration::from_secs(5),
        max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
    };

    let (da, db) = tokio::join!(
        run_participant(&mut alice, alice_transport, config),
        run_participant(&mut bob, bob_transport, config),
    );

    assert_eq!(da, Decision::Attack);
    assert_eq!(db, Decision::Attack);
    assert!(alice.bilateral_receipt().is_some());
    assert!(bob.bilateral_receipt().is_some());
    Ok(())
}
