use crate::config::WsConfig;
use crate::middleware::{error_handling, guards::User};
use crate::models::UserId;
use crate::state::AppState;
use crate::websocket::message_types::{WsControlReply, WsInboundEvent};
use crate::websocket::{ConnectionHandle, RealtimeHub};
use actix::{fut::WrapFuture, Actor, ActorContext, ActorFutureExt, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One live connection
///
/// Outbound frames arrive on the hub's queue for this handle and are
/// written to the socket in order. Stopping the actor disconnects the
/// handle from the hub.
struct WsSession {
    handle: ConnectionHandle,
    user_id: UserId,
    hub: RealtimeHub,
    outbound: Option<UnboundedReceiver<String>>,
    config: WsConfig,
    hb: Instant,
}

impl WsSession {
    fn new(
        handle: ConnectionHandle,
        user_id: UserId,
        hub: RealtimeHub,
        outbound: UnboundedReceiver<String>,
        config: WsConfig,
    ) -> Self {
        Self {
            handle,
            user_id,
            hub,
            outbound: Some(outbound),
            config,
            hb: Instant::now(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.config.client_timeout;
        ctx.run_interval(self.config.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(
                    user_id = %act.user_id,
                    connection = %act.handle,
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn reply(ctx: &mut ws::WebsocketContext<Self>, reply: &WsControlReply) {
        match serde_json::to_string(reply) {
            Ok(text) => ctx.text(text),
            Err(e) => tracing::error!(error = %e, "Failed to encode control reply"),
        }
    }

    fn handle_event(&mut self, evt: WsInboundEvent, ctx: &mut ws::WebsocketContext<Self>) {
        match evt {
            WsInboundEvent::Ping => Self::reply(ctx, &WsControlReply::Pong),
            WsInboundEvent::Resync => {
                let hub = self.hub.clone();
                let handle = self.handle;
                let fut = async move { hub.resync(handle).await };

                ctx.spawn(fut.into_actor(self).map(|result, act, ctx| {
                    let reply = match result {
                        Ok(channel_count) => WsControlReply::Resynced { channel_count },
                        Err(e) => {
                            tracing::warn!(
                                user_id = %act.user_id,
                                connection = %act.handle,
                                error = %e,
                                "Resync failed"
                            );
                            let (_, body) = error_handling::map_error(&e);
                            WsControlReply::Error {
                                code: body.code,
                                message: body.message,
                            }
                        }
                    };
                    Self::reply(ctx, &reply);
                }));
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::debug!(
            user_id = %self.user_id,
            connection = %self.handle,
            "WebSocket session started"
        );
        self.hb(ctx);

        if let Some(rx) = self.outbound.take() {
            ctx.add_stream(UnboundedReceiverStream::new(rx));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.hub.disconnect(self.handle);
    }
}

// Outbound frames from the hub
impl StreamHandler<String> for WsSession {
    fn handle(&mut self, frame: String, ctx: &mut Self::Context) {
        ctx.text(frame);
    }

    fn finished(&mut self, ctx: &mut Self::Context) {
        // The hub dropped this connection
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                match serde_json::from_str::<WsInboundEvent>(&text) {
                    Ok(evt) => self.handle_event(evt, ctx),
                    Err(e) => {
                        tracing::debug!(connection = %self.handle, error = %e, "Unrecognized WS frame");
                        Self::reply(
                            ctx,
                            &WsControlReply::Error {
                                code: error_types::error_codes::INVALID_REQUEST.to_string(),
                                message: "unrecognized frame".to_string(),
                            },
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!(connection = %self.handle, "Binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(connection = %self.handle, ?reason, "WebSocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                tracing::warn!(connection = %self.handle, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// GET /ws
///
/// The connection is registered and fully subscribed before the upgrade
/// completes; a membership lookup failure rejects the upgrade.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    user: User,
) -> Result<HttpResponse, Error> {
    let (handle, outbound) = state.hub.connect(user.id).await?;

    let session = WsSession::new(
        handle,
        user.id,
        state.hub.clone(),
        outbound,
        state.config.ws.clone(),
    );

    ws::start(session, &req, stream).map_err(|e| {
        tracing::warn!(user_id = %user.id, connection = %handle, error = %e, "WebSocket upgrade failed");
        state.hub.disconnect(handle);
        e
    })
}
