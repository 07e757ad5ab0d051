//! Watch command handler

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::mpsc;

use tether_core::{Notification, NotificationHandler, Sdk, SubscribeOptions};

use super::parse_object;
use crate::output::Output;

/// Print notifications for a collection until Ctrl-C
pub async fn run(
    sdk: &Sdk,
    index: &str,
    collection: &str,
    filters: Option<&str>,
    output: &Output,
) -> Result<()> {
    let filters = Value::Object(parse_object(filters)?);

    // Handlers run on the SDK event loop, so hand notifications over
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    let handler: NotificationHandler = Arc::new(move |notification| {
        let _ = tx.send(notification);
    });

    let subscription_id = sdk
        .realtime()
        .subscribe(index, collection, filters, SubscribeOptions::default(), handler)
        .await
        .context("Subscription failed")?;
    output.message(&format!(
        "Watching {}:{} (subscription {}), press Ctrl-C to stop",
        index, collection, subscription_id
    ));

    loop {
        tokio::select! {
            Some(notification) = rx.recv() => output.print_notification(&notification),
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    sdk.realtime()
        .unsubscribe(&subscription_id)
        .await
        .context("Failed to unsubscribe")?;
    output.success("Unsubscribed");
    Ok(())
}
