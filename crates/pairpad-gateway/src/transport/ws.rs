//! WebSocket handler.
//!
//! - Upgrade HTTP -> WS and bind the connection to one room
//! - Lifecycle: ping + idle timeout
//! - Policy on raw length, then decode once, then hand the command to the session
//! - Outbound frames are drained from the session's queue in the same loop

use axum::{
    extract::{ws::Message, ws::WebSocket, ws::WebSocketUpgrade, Query, State},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tracing::{debug, field, info_span, Instrument, Span};

use pairpad_core::error::{ClientCode, PairpadError, Result};
use pairpad_core::protocol::command::ClientCommand;
use pairpad_core::protocol::frames;

use crate::app_state::AppState;
use crate::policy::{InboundPolicy, PolicyDecision};
use crate::session::RoomSession;
use crate::transport::codec::{decode, frame_len, Inbound};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub room: String,
    #[serde(default = "default_name")]
    pub name: String,
}

fn default_name() -> String {
    "Anonymous".to_string()
}

pub async fn ws_upgrade(State(app): State<AppState>, ws: WebSocketUpgrade, Query(q): Query<WsQuery>) -> Response {
    app.metrics().ws_upgrades.inc(&[]);
    ws.on_upgrade(move |socket| async move {
        let span = info_span!("session", room = %q.room, session = field::Empty);
        if let Err(e) = run_session(app, q, socket).instrument(span).await {
            debug!(error = %e, "session rejected");
        }
    })
}

fn error_frame(e: &PairpadError) -> String {
    frames::sys_error(e.client_code().as_str(), &e.to_string())
}

async fn run_session(app: AppState, q: WsQuery, socket: WebSocket) -> Result<()> {
    let gw = app.cfg().gateway.clone();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(gw.outbound_queue);
    let (mut ws_tx, mut ws_rx) = socket.split();

    let mut session = match RoomSession::open(app.clone(), &q.room, &q.name, out_tx.clone()).await {
        Ok(s) => s,
        Err(e) => {
            let _ = ws_tx.send(Message::Text(error_frame(&e))).await;
            let _ = ws_tx.send(Message::Close(None)).await;
            return Err(e);
        }
    };
    Span::current().record("session", session.session_id());

    let mut policy = InboundPolicy::new(gw.max_frame_bytes, &app.cfg().limits);
    let idle_timeout = Duration::from_millis(gw.idle_timeout_ms);
    let mut ping_tick = tokio::time::interval(Duration::from_millis(gw.ping_interval_ms));
    ping_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    loop {
        tokio::select! {
            maybe_out = out_rx.recv() => {
                let Some(frame) = maybe_out else { break };
                if ws_tx.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }

            incoming = ws_rx.next() => {
                let Some(Ok(msg)) = incoming else { break };
                last_activity = Instant::now();

                let decision = policy.check(frame_len(&msg));
                if decision != PolicyDecision::Pass {
                    app.metrics().policy_decisions.inc(&[("decision", decision.label())]);
                }
                match decision {
                    PolicyDecision::Pass => {}
                    PolicyDecision::Drop => continue,
                    PolicyDecision::Close { code, msg } => {
                        let _ = ws_tx.send(Message::Text(frames::sys_error(code.as_str(), msg))).await;
                        break;
                    }
                }

                match decode(msg) {
                    Ok(Inbound::Text { env, .. }) => {
                        if env.room.as_deref().is_some_and(|r| r != session.room()) {
                            let _ = out_tx.try_send(frames::sys_error(ClientCode::BadRequest.as_str(), "connection is bound to another room"));
                            continue;
                        }
                        match ClientCommand::try_from(&env) {
                            Ok(cmd) => session.handle_command(cmd).await,
                            Err(e) => {
                                debug!(kind = %env.kind(), error = %e, "rejected command");
                                app.metrics().decode_errors.inc(&[("source", "client")]);
                                let _ = out_tx.try_send(error_frame(&e));
                            }
                        }
                    }
                    Ok(Inbound::Binary { .. }) => {
                        let _ = out_tx.try_send(frames::sys_error(ClientCode::BadRequest.as_str(), "binary frames are not supported"));
                    }
                    Ok(Inbound::Ping(_)) | Ok(Inbound::Pong(_)) => {}
                    Ok(Inbound::Close) => break,
                    Err(e) => {
                        app.metrics().decode_errors.inc(&[("source", "client")]);
                        let _ = out_tx.try_send(error_frame(&e));
                    }
                }
            }

            _ = ping_tick.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    debug!("idle timeout");
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            ev = session.next_event() => {
                if !session.handle_event(ev).await {
                    break;
                }
            }
        }
    }

    session.close();
    Ok(())
}
