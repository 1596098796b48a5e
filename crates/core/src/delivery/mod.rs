//! Concrete effect collaborators: the webhook notifier and the approval form renderer.

pub mod document;
pub mod webhook;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::AppConfig;
use crate::flows::effects::{EffectDispatcher, EffectError};

pub use document::TeraDocumentRenderer;
pub use webhook::WebhookNotifier;

/// Wires the collaborators the config enables. Disabled notifications or an unset
/// document directory leave that effect kind without a handler.
pub fn effect_dispatcher(config: &AppConfig) -> Result<EffectDispatcher, EffectError> {
    let mut dispatcher = EffectDispatcher::default();

    let notifications = &config.notifications;
    if let (true, Some(endpoint)) = (notifications.enabled, notifications.endpoint.as_deref()) {
        let notifier = WebhookNotifier::new(
            endpoint,
            notifications.channel_token.clone(),
            Duration::from_secs(notifications.timeout_secs),
        )?;
        dispatcher = dispatcher.with_notifier(Arc::new(notifier));
    }

    if let Some(dir) = config.documents.output_dir.clone() {
        dispatcher = dispatcher.with_renderer(Arc::new(TeraDocumentRenderer::new(Some(dir))?));
    }

    info!(
        event_name = "effects.dispatcher_configured",
        notifications = dispatcher.has_notifier(),
        documents = dispatcher.has_renderer(),
        "effect collaborators wired"
    );
    Ok(dispatcher)
}

#[cfg(test)]
mod tests {
    use crate::config::AppConfig;

    use super::effect_dispatcher;

    #[test]
    fn defaults_wire_no_collaborators() {
        let dispatcher = effect_dispatcher(&AppConfig::default()).expect("dispatcher");
        assert!(!dispatcher.has_notifier());
        assert!(!dispatcher.has_renderer());
    }

    #[test]
    fn enabled_sections_wire_notifier_and_renderer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.notifications.enabled = true;
        config.notifications.endpoint = Some("https://hooks.example.test/claims".to_owned());
        config.documents.output_dir = Some(dir.path().to_path_buf());

        let dispatcher = effect_dispatcher(&config).expect("dispatcher");
        assert!(dispatcher.has_notifier());
        assert!(dispatcher.has_renderer());
    }

    #[test]
    fn endpoint_without_enabled_flag_stays_silent() {
        let mut config = AppConfig::default();
        config.notifications.endpoint = Some("https://hooks.example.test/claims".to_owned());

        let dispatcher = effect_dispatcher(&config).expect("dispatcher");
        assert!(!dispatcher.has_notifier());
    }
}
