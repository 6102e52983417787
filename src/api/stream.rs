use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;

use crate::api::http::AppState;
use crate::logging::LogContext;
use crate::pubsub::Subscription;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Turn a subscription into a stream of SSE events, one per record.
///
/// The stream owns the subscription, so dropping the stream (client gone)
/// unsubscribes it.
pub fn subscription_events(
    subscription: Subscription,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(subscription, |subscription| async move {
        let record = subscription.recv().await?;
        let event = Event::default().data(record.as_str());
        Some((Ok(event), subscription))
    })
}

/// GET /addresses/:address/subscribe - live feed of transactions touching
/// the address
pub async fn subscribe(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let subscription = state.index.subscribe(&address);

    LogContext::new("gateway", "subscribe")
        .with_address(&address)
        .with_subscription_id(&subscription.id())
        .info(&format!("New subscription for {}", address));

    let events = subscription_events(subscription).take_until(state.shutdown.cancelled_owned());

    Sse::new(events).keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
}
