//! Event dispatch
//!
//! Binds socket definitions to a connection and runs each inbound event
//! through its definition: stream check, middleware in strict sequence,
//! then the handler. The first middleware error goes to the ack and the
//! handler is skipped.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::realtime::event::{Ack, EventContext, EventError, InboundEvent, Payload};
use crate::realtime::socket::{SocketDefinition, SocketMode};
use crate::realtime::transport::{Connection, RealtimeServer};

/// Attach every definition to `connection`
///
/// Each inbound event is processed on its own tokio task, so slow handlers
/// on one event never hold up another.
pub fn bind_definitions(
    connection: &Arc<dyn Connection>,
    definitions: &[Arc<SocketDefinition>],
    transport: Option<Arc<dyn RealtimeServer>>,
) {
    for definition in definitions {
        let weak = Arc::downgrade(connection);
        let definition = Arc::clone(definition);
        let transport = transport.clone();
        let event = definition.event.clone();

        connection.on(
            &event,
            Arc::new(move |inbound: InboundEvent| {
                let Some(connection) = weak.upgrade() else {
                    return;
                };
                let definition = Arc::clone(&definition);
                let transport = transport.clone();
                match tokio::runtime::Handle::try_current() {
                    Ok(handle) => {
                        handle.spawn(dispatch_event(connection, definition, transport, inbound));
                    }
                    Err(_) => warn!(
                        "Dropped \"{}\" event on {}: no async runtime",
                        definition.event,
                        connection.id()
                    ),
                }
            }),
        );
        debug!("Bound event \"{}\" on {}", event, connection.id());
    }
}

/// Process one inbound event
pub async fn dispatch_event(
    connection: Arc<dyn Connection>,
    definition: Arc<SocketDefinition>,
    transport: Option<Arc<dyn RealtimeServer>>,
    inbound: InboundEvent,
) {
    let InboundEvent { args, ack } = inbound;

    let (stream, message) = match definition.mode {
        SocketMode::Stream => match args.first() {
            Some(Payload::Stream(stream)) => (
                Some(stream.clone()),
                args.get(1).and_then(Payload::as_json).cloned(),
            ),
            _ => {
                let err = EventError::invalid_stream(&definition.event);
                debug!("{} on {}", err.error, connection.id());
                reply_error(connection.as_ref(), ack, err);
                return;
            }
        },
        SocketMode::Message => (
            args.iter().find_map(Payload::as_stream).cloned(),
            args.iter().find_map(Payload::as_json).cloned(),
        ),
    };

    let ctx = EventContext {
        connection: Arc::clone(&connection),
        message,
        stream,
        transport,
        definition: Arc::clone(&definition),
    };

    for middleware in &definition.middleware {
        if let Err(err) = middleware.handle(&ctx).await {
            debug!(
                "Middleware rejected \"{}\" on {}: {}",
                definition.event,
                connection.id(),
                err
            );
            reply_error(connection.as_ref(), ack, err);
            return;
        }
    }

    definition.on_event.on_event(&ctx, ack).await;
}

/// Deliver an error through the ack, or as an `error` event without one
fn reply_error(connection: &dyn Connection, ack: Option<Ack>, err: EventError) {
    match ack {
        Some(ack) => ack.send(Err(err)),
        None => {
            if let Err(e) = connection.emit("error", vec![Payload::Json(err.to_value())]) {
                warn!("Failed to emit error on {}: {}", connection.id(), e);
            }
        }
    }
}
