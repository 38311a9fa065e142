// SPDX-FileCopyrightText: 2026 Maestro Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Selection of the routers an event message is handed to.

use maestro_core::{EventMessage, FlowType, MaestroError, PluginStatus};
use tracing::{debug, error, info};

use crate::table::{RegistrationEntry, RegistrationTable};

enum Delivery {
    Routed,
    Dropped,
    NotStarted(PluginStatus),
    NoInterface,
}

/// Hand `message` to the `flow` routers of its recipients.
///
/// An ADDRESSED message goes to its target only; any other message is
/// broadcast to every started plugin whose descriptor supports its data type.
/// Returns the number of routers that accepted the message. The call never
/// waits for handling.
pub(crate) async fn dispatch(
    table: &RegistrationTable,
    flow: FlowType,
    message: EventMessage,
) -> Result<usize, MaestroError> {
    message.validate().map_err(MaestroError::InvalidMessage)?;

    if message.is_addressed() {
        let Some(target) = message.configuration_id else {
            return Err(MaestroError::InvalidMessage(format!(
                "transaction {}: addressed message without a target plugin",
                message.transaction_id
            )));
        };
        let Some(entry) = table.get(target).await else {
            error!(
                transaction_id = %message.transaction_id,
                configuration_id = %target,
                "the plugin is not registered, message dropped"
            );
            return Ok(0);
        };
        info!(
            transaction_id = %message.transaction_id,
            configuration_id = %target,
            %flow,
            "dispatching the event to the plugin"
        );
        let transaction_id = message.transaction_id.clone();
        return Ok(match deliver(&entry, flow, message).await {
            Delivery::Routed => 1,
            Delivery::NotStarted(status) => {
                error!(
                    %transaction_id,
                    configuration_id = %target,
                    %status,
                    "the plugin is not started, message dropped"
                );
                0
            }
            Delivery::NoInterface => {
                info!(%transaction_id, configuration_id = %target, %flow, "no event dispatched since the interface is not started");
                0
            }
            Delivery::Dropped => 0,
        });
    }

    let mut delivered = 0;
    for entry in table.entries().await {
        if !entry.is_compatible(&message.data_type) {
            continue;
        }
        match deliver(&entry, flow, message.clone()).await {
            Delivery::Routed => delivered += 1,
            Delivery::NotStarted(status) => {
                debug!(configuration_id = %entry.configuration_id(), %status, "skipping plugin that is not started");
            }
            Delivery::NoInterface => {
                debug!(configuration_id = %entry.configuration_id(), %flow, "skipping plugin without interface");
            }
            Delivery::Dropped => {}
        }
    }
    debug!(
        transaction_id = %message.transaction_id,
        data_type = %message.data_type,
        %flow,
        recipients = delivered,
        "broadcast dispatched"
    );
    Ok(delivered)
}

async fn deliver(entry: &RegistrationEntry, flow: FlowType, message: EventMessage) -> Delivery {
    let state = entry.lock().await;
    if state.status != PluginStatus::Started {
        return Delivery::NotStarted(state.status);
    }
    match state.router(flow) {
        Some(router) if router.route(message) => Delivery::Routed,
        Some(_) => Delivery::Dropped,
        None => Delivery::NoInterface,
    }
}
