use super::protocol::{parse_frame, DeviceEvent, FrameDecoder};
use crate::api::DeviceClient;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

struct FeedState {
    client: DeviceClient,
    reconnect_delay: Duration,
    body: Option<BoxStream<'static, reqwest::Result<Vec<u8>>>>,
    decoder: FrameDecoder,
    ready: VecDeque<DeviceEvent>,
}

impl FeedState {
    async fn next_event(&mut self) -> DeviceEvent {
        loop {
            if let Some(event) = self.ready.pop_front() {
                return event;
            }

            if self.body.is_none() {
                match self.client.open_event_feed().await {
                    Ok(response) => {
                        info!(base_url = %self.client.base_url(), "connected to event feed");
                        self.body = Some(
                            response
                                .bytes_stream()
                                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                                .boxed(),
                        );
                    }
                    Err(e) => {
                        warn!("event feed unavailable: {e}; reconnecting after delay");
                        sleep(self.reconnect_delay).await;
                    }
                }
                continue;
            }

            let next = match self.body.as_mut() {
                Some(body) => body.next().await,
                None => continue,
            };

            match next {
                Some(Ok(chunk)) => {
                    for line in self.decoder.push(&chunk) {
                        match parse_frame(&line) {
                            Ok(Some(event)) => self.ready.push_back(event),
                            Ok(None) => debug!("ignoring frame on unhandled topic"),
                            Err(e) => warn!(error = %e, "failed to parse event frame"),
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!("event feed error: {e}; reconnecting after delay");
                    self.disconnect().await;
                }
                None => {
                    info!("event feed closed by device; reconnecting after delay");
                    self.disconnect().await;
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        self.body = None;
        self.decoder.reset();
        sleep(self.reconnect_delay).await;
    }
}

/// Endless stream of device events, reconnecting whenever the feed drops
pub fn event_stream(
    client: DeviceClient,
    reconnect_delay: Duration,
) -> impl Stream<Item = DeviceEvent> + Send {
    let state = FeedState {
        client,
        reconnect_delay,
        body: None,
        decoder: FrameDecoder::default(),
        ready: VecDeque::new(),
    };

    stream::unfold(state, |mut state| async move {
        let event = state.next_event().await;
        Some((event, state))
    })
}
