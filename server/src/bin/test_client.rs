use bincode::{deserialize, serialize};
use shared::{ClientPacket, ServerPacket};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{sleep, timeout};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Create local socket
    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    println!("Client socket bound to {}", socket.local_addr()?);

    let server_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_string())
        .parse::<SocketAddr>()?;

    let join = ClientPacket::Join {
        name: Some("probe".to_string()),
    };
    println!("Sending join request to {}", server_addr);
    socket.send_to(&serialize(&join)?, server_addr).await?;

    let mut buf = vec![0u8; 65536];

    // The first reply may be preceded by a state broadcast
    let player_id = loop {
        let (len, _) = timeout(Duration::from_secs(2), socket.recv_from(&mut buf)).await??;
        match deserialize::<ServerPacket>(&buf[0..len]) {
            Ok(ServerPacket::Joined {
                player_id,
                world_size,
                tick_rate,
            }) => {
                println!(
                    "Joined as {} (world {}, {} ticks/s)",
                    player_id, world_size, tick_rate
                );
                break player_id;
            }
            Ok(ServerPacket::Rejected { reason }) | Ok(ServerPacket::Disconnected { reason }) => {
                println!("Server refused: {}", reason);
                return Ok(());
            }
            Ok(_) => continue,
            Err(e) => println!("Failed to deserialize response: {}", e),
        }
    };

    // Steer in a slow circle, boosting every other second
    for i in 0..10 {
        let heading = ClientPacket::SetHeading {
            angle: i as f32 * 0.6,
        };
        socket.send_to(&serialize(&heading)?, server_addr).await?;
        let boost = ClientPacket::SetBoost {
            boosting: i % 2 == 0,
        };
        socket.send_to(&serialize(&boost)?, server_addr).await?;

        match timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await {
            Ok(Ok((len, _))) => match deserialize::<ServerPacket>(&buf[0..len]) {
                Ok(ServerPacket::State(delta)) => {
                    if let Some(me) = delta.players.as_ref().and_then(|p| p.get(&player_id)) {
                        let head = me.segments.first();
                        println!(
                            "t={} length={} score={} head={:?}",
                            delta.timestamp,
                            me.segments.len(),
                            me.score,
                            head
                        );
                    }
                }
                Ok(ServerPacket::Died(notice)) => {
                    println!("Died with score {} at length {}", notice.score, notice.length);
                    break;
                }
                Ok(other) => println!("Unexpected packet: {:?}", other),
                Err(e) => println!("Failed to deserialize state: {}", e),
            },
            Ok(Err(e)) => println!("Error receiving state: {}", e),
            Err(_) => println!("No state received this second"),
        }

        sleep(Duration::from_secs(1)).await;
    }

    println!("Sending leave");
    socket
        .send_to(&serialize(&ClientPacket::Leave)?, server_addr)
        .await?;

    println!("Test client finished");
    Ok(())
}
