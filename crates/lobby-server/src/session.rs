//! Client session: the glue between one connection and its lobby hub.
//!
//! A session registers a client with the hub, then runs two loops:
//!
//! - the reader (this task) forwards every inbound message to the hub as a
//!   broadcast to every member, the sender included;
//! - the writer (its own task) drains the client's outbound buffer into the
//!   connection and closes the connection once the hub drops the client.
//!
//! Whichever side stops first stops the other. The session unregisters the
//! client exactly once, on its way out.

use crate::metrics;
use lobby_core::{ClientId, Hub, Outbound};
use lobby_transport::{Connection, ConnectionReader, ConnectionWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Run a client session until the connection or the hub goes away.
///
/// `on_joined` runs once the hub has accepted the client.
pub async fn run_session<F>(conn: Box<dyn Connection>, hub: Hub, on_joined: F)
where
    F: FnOnce(),
{
    let transport = conn.transport();
    let remote = conn.remote_addr();
    let (client, outbound) = hub.new_client();
    let client_id = client.id().clone();
    let (reader, mut writer) = conn.split();

    if let Err(e) = hub.register(client).await {
        warn!(lobby = %hub.id(), client = %client_id, error = %e, "Registration rejected");
        metrics::record_error("register");
        let _ = writer.close().await;
        return;
    }
    on_joined();

    debug!(
        lobby = %hub.id(),
        client = %client_id,
        transport,
        remote = ?remote,
        "Client joined"
    );

    let stop = CancellationToken::new();
    let writer_task = tokio::spawn(write_loop(
        writer,
        outbound,
        stop.clone(),
        client_id.clone(),
    ));

    read_loop(reader, &hub, &client_id, &stop).await;

    if let Err(e) = hub.unregister(&client_id).await {
        // Hub already gone; its exit dropped our buffer
        debug!(client = %client_id, error = %e, "Unregister skipped");
    }

    // Ends once the hub drops the client's buffer
    if let Err(e) = writer_task.await {
        warn!(client = %client_id, error = %e, "Writer task failed");
    }

    debug!(lobby = %hub.id(), client = %client_id, "Client left");
}

async fn read_loop(
    mut reader: Box<dyn ConnectionReader>,
    hub: &Hub,
    client_id: &ClientId,
    stop: &CancellationToken,
) {
    loop {
        tokio::select! {
            () = stop.cancelled() => break,

            received = reader.recv() => match received {
                Ok(Some(data)) => {
                    metrics::record_message(data.len());
                    if hub.broadcast(None, data).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    debug!(client = %client_id, "Connection closed by peer");
                    break;
                }
                Err(e) => {
                    warn!(client = %client_id, error = %e, "Receive failed");
                    metrics::record_error("receive");
                    break;
                }
            },
        }
    }
}

async fn write_loop(
    mut writer: Box<dyn ConnectionWriter>,
    mut outbound: Outbound,
    stop: CancellationToken,
    client_id: ClientId,
) {
    while let Some(data) = outbound.recv().await {
        if let Err(e) = writer.send(data).await {
            warn!(client = %client_id, error = %e, "Send failed");
            metrics::record_error("send");
            break;
        }
    }

    stop.cancel();
    if let Err(e) = writer.close().await {
        debug!(client = %client_id, error = %e, "Close failed");
    }
}
