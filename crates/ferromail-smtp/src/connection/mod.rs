//! Tokio transport for the session engine.
//!
//! [`deliver`] is the bridge between a [`Session`] and real sockets: it
//! drains the session's actions, performs the connects, writes, TLS
//! upgrades and closes they ask for, and feeds everything the server
//! sends back into the session until it finishes. Protocol decisions
//! stay in the session; this loop only moves bytes.

mod stream;

pub use stream::{SmtpStream, connect, connect_tls};

use crate::session::{Action, CloseReason, Session, SessionEvent};
use crate::types::MessageSource;

const READ_BUFFER: usize = 8 * 1024;

/// Drives the session over real sockets until it goes idle.
///
/// Session events are handed to `on_event` in the order they occur.
/// Transport failures are reported into the session and come back out
/// as classified events, so this function itself does not fail: it
/// returns the number of messages delivered.
pub async fn deliver<M, F>(session: &mut Session<M>, mut on_event: F) -> u32
where
    M: MessageSource,
    F: FnMut(SessionEvent),
{
    let mut stream: Option<SmtpStream> = None;
    let mut host = String::new();
    let mut buf = vec![0_u8; READ_BUFFER];
    let mut delivered = 0;

    loop {
        while let Some(action) = session.poll_action() {
            match action {
                Action::Connect {
                    host: server,
                    port,
                    implicit_tls,
                } => {
                    host = server;
                    let connected = if implicit_tls {
                        stream::connect_tls(&host, port).await
                    } else {
                        stream::connect(&host, port).await
                    };
                    match connected {
                        Ok(opened) => stream = Some(opened),
                        Err(error) => {
                            tracing::warn!(host = %host, port, error = %error, "connect failed");
                            session.on_closed(CloseReason::Unreachable);
                        }
                    }
                }
                Action::Send(bytes) => {
                    if let Some(open) = stream.as_mut() {
                        match open.write_all(&bytes).await {
                            Ok(()) => session.on_send_complete(),
                            Err(error) => {
                                tracing::warn!(error = %error, "write failed");
                                stream = None;
                                session.on_closed(CloseReason::Dropped);
                            }
                        }
                    } else {
                        session.on_closed(CloseReason::Dropped);
                    }
                }
                Action::UpgradeTls => {
                    if let Some(plain) = stream.take() {
                        match plain.upgrade_to_tls(&host).await {
                            Ok(upgraded) => {
                                stream = Some(upgraded);
                                session.on_tls_upgraded(true);
                            }
                            Err(error) => {
                                tracing::warn!(host = %host, error = %error, "TLS handshake failed");
                                session.on_tls_upgraded(false);
                            }
                        }
                    }
                }
                Action::Close => {
                    stream = None;
                }
                Action::Event(event) => {
                    if let SessionEvent::Finished { sent } = &event {
                        delivered += sent;
                    }
                    on_event(event);
                }
            }
        }

        let Some(open) = stream.as_mut() else {
            if session.is_sending() {
                // Transport gone with a transfer still pending.
                session.on_closed(CloseReason::Dropped);
                continue;
            }
            break;
        };

        match open.read(&mut buf).await {
            Ok(0) => {
                stream = None;
                session.on_closed(CloseReason::Dropped);
            }
            Ok(n) => session.on_bytes(&buf[..n]),
            Err(error) => {
                tracing::warn!(error = %error, "read failed");
                stream = None;
                session.on_closed(CloseReason::Dropped);
            }
        }
    }

    delivered
}
