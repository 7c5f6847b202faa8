use crate::config::TelemetryConfig;
use crate::models::phase::{PhaseEvent, PhaseEventKind};
use anyhow::Result;
use tracing::{error, info};

/// Sends alerts via Telegram or Discord webhooks. Always logs.
pub struct AlertManager {
    config: TelemetryConfig,
    http: reqwest::Client,
}

impl AlertManager {
    pub fn new(config: TelemetryConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Send an alert message.
    pub async fn send(&self, message: &str) {
        info!("ALERT: {message}");

        if let Err(e) = self.send_telegram(message).await {
            error!("Telegram alert failed: {e}");
        }

        if let Err(e) = self.send_discord(message).await {
            error!("Discord alert failed: {e}");
        }
    }

    async fn send_telegram(&self, message: &str) -> Result<()> {
        let (Some(token), Some(chat_id)) = (&self.config.telegram_bot_token, &self.config.telegram_chat_id) else {
            return Ok(()); // Not configured
        };

        let url = format!("https://api.telegram.org/bot{token}/sendMessage");
        let body = serde_json::json!({
            "chat_id": chat_id,
            "text": format!("📦 BOXWATCH: {message}"),
        });

        self.http.post(&url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    async fn send_discord(&self, message: &str) -> Result<()> {
        let Some(webhook_url) = &self.config.discord_webhook_url else {
            return Ok(());
        };

        let body = serde_json::json!({
            "content": format!("📦 **BOXWATCH**: {message}")
        });

        self.http.post(webhook_url).json(&body).send().await?.error_for_status()?;
        Ok(())
    }

    /// Whether events of this kind go out at all.
    pub fn wants(&self, kind: PhaseEventKind) -> bool {
        match kind {
            PhaseEventKind::AccumStart | PhaseEventKind::AccumEnd => self.config.alert_on_accum,
            PhaseEventKind::BreakoutConfirmed | PhaseEventKind::BreakoutExpire => {
                self.config.alert_on_breakout
            }
            PhaseEventKind::PendingCreate
            | PhaseEventKind::PendingExpire
            | PhaseEventKind::TrapKill => self.config.alert_on_pending,
        }
    }

    /// Alert on a phase change.
    pub async fn on_phase_event(&self, event: &PhaseEvent) {
        if self.wants(event.kind) {
            self.send(&format_event(event)).await;
        }
    }

    /// Alert on error.
    pub async fn on_error(&self, error: &str) {
        if self.config.alert_on_error {
            self.send(&format!("⚠️ Error: {error}")).await;
        }
    }
}

pub fn format_event(event: &PhaseEvent) -> String {
    let icon = match event.kind {
        PhaseEventKind::AccumStart => "🟡",
        PhaseEventKind::AccumEnd => "⚪",
        PhaseEventKind::BreakoutConfirmed => "🚀",
        PhaseEventKind::BreakoutExpire => "⏹",
        PhaseEventKind::PendingCreate => "👀",
        PhaseEventKind::PendingExpire => "⌛",
        PhaseEventKind::TrapKill => "🪤",
    };
    format!("{icon} {}", event.summary())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_filters() {
        let alerts = AlertManager::new(TelemetryConfig::default());
        assert!(alerts.wants(PhaseEventKind::BreakoutConfirmed));
        assert!(alerts.wants(PhaseEventKind::AccumStart));
        assert!(!alerts.wants(PhaseEventKind::PendingCreate));
        assert!(!alerts.wants(PhaseEventKind::TrapKill));
    }

    #[test]
    fn test_format_event() {
        let event = PhaseEvent::new("SOLUSDT", PhaseEventKind::BreakoutConfirmed, 0)
            .score(72.0)
            .trap_score(15);
        let text = format_event(&event);
        assert!(text.starts_with("🚀 SOLUSDT BREAKOUT_CONFIRMED"));
        assert!(text.contains("trap=15"));
    }

    #[tokio::test]
    async fn test_unconfigured_sinks_only_log() {
        let alerts = AlertManager::new(TelemetryConfig::default());
        assert!(alerts.send_telegram("x").await.is_ok());
        assert!(alerts.send_discord("x").await.is_ok());
    }
}
