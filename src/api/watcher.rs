//! # Health Watcher
//!
//! Background task that polls the cached provider health every five minutes
//! and notifies the alert sink on state transitions: a degraded provider set
//! fires one critical alert, recovery fires one ok alert, and steady state
//! stays silent. The same tick watches provider bearer tokens that happen to
//! be JWTs and warns ahead of their expiry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::state::AppState;
use crate::config::AppConfig;
use crate::errors::{Error, Result};
use crate::orchestrator::AlertSink;

const WATCH_INTERVAL: Duration = Duration::from_secs(300);

/// Per-token alert state; alerts fire only on transitions between these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TokenState {
    #[default]
    Ok,
    Warning,
    Expired,
}

/// Spawn the watcher. The task runs until aborted (the caller owns the
/// handle and aborts it on shutdown).
pub fn spawn_health_watcher(state: Arc<AppState>, sink: Arc<dyn AlertSink>) -> JoinHandle<()> {
    info!(interval_secs = WATCH_INTERVAL.as_secs(), "health watcher started");
    tokio::spawn(async move {
        let mut last_degraded = false;
        let mut last_token_state: HashMap<String, TokenState> = HashMap::new();

        let mut ticker = tokio::time::interval(WATCH_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick completes immediately; skip it so probes start one
        // interval after startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            check_provider_health(&state, sink.as_ref(), &mut last_degraded).await;
            check_token_expiry(&state.config, sink.as_ref(), &mut last_token_state).await;
        }
    })
}

async fn check_provider_health(
    state: &AppState,
    sink: &dyn AlertSink,
    last_degraded: &mut bool,
) {
    let resp = state.health_snapshot().await;
    let degraded = resp.status == "degraded";

    if degraded && !*last_degraded {
        let mut issues = Vec::new();
        for p in &resp.providers {
            if p.status != "ok" {
                match &p.error {
                    Some(err) => issues.push(format!("{}: {}", p.name, err)),
                    None => issues.push(p.name.clone()),
                }
            }
        }
        let mut msg = "herald: provider degraded".to_string();
        if !issues.is_empty() {
            msg = format!("{msg} — {}", issues.join("; "));
        }
        match sink.send_alert("critical", &msg).await {
            Ok(()) => warn!(detail = %msg, "health watcher: degraded alert sent"),
            Err(e) => error!(error = %e, "health watcher: failed to send degraded alert"),
        }
    } else if !degraded && *last_degraded {
        match sink.send_alert("ok", "herald: all providers healthy").await {
            Ok(()) => info!("health watcher: recovery alert sent"),
            Err(e) => error!(error = %e, "health watcher: failed to send recovery alert"),
        }
    }

    *last_degraded = degraded;
}

async fn check_token_expiry(
    config: &AppConfig,
    sink: &dyn AlertSink,
    last_state: &mut HashMap<String, TokenState>,
) {
    if config.alerts.token_expiry_warning_days == 0 {
        return;
    }
    let threshold = chrono::Duration::days(config.alerts.token_expiry_warning_days as i64);
    let now = Utc::now();

    for p in &config.providers {
        if p.token.is_empty() {
            continue;
        }
        // Not a JWT or no exp claim — nothing to watch
        let Ok(expiry) = decode_jwt_expiry(&p.token) else {
            continue;
        };

        let remaining = expiry - now;
        let state = classify_token(remaining, threshold);
        let prev = last_state.insert(p.name.clone(), state).unwrap_or_default();

        if state == prev {
            continue;
        }

        match state {
            TokenState::Expired => {
                let msg = format!(
                    "herald: {} token ({}) has EXPIRED — provider access broken",
                    p.kind, p.name
                );
                match sink.send_alert("critical", &msg).await {
                    Ok(()) => error!(provider = %p.name, "health watcher: token expired alert sent"),
                    Err(e) => {
                        error!(provider = %p.name, error = %e, "health watcher: failed to send expiry alert")
                    }
                }
            }
            TokenState::Warning => {
                let days = remaining.num_days();
                let msg = format!(
                    "herald: {} token ({}) expires in {} day(s) — renew before it expires",
                    p.kind, p.name, days
                );
                match sink.send_alert("warning", &msg).await {
                    Ok(()) => {
                        warn!(provider = %p.name, days, "health watcher: token expiry warning sent")
                    }
                    Err(e) => {
                        error!(provider = %p.name, error = %e, "health watcher: failed to send expiry warning")
                    }
                }
            }
            // Token was renewed — no alert, just log
            TokenState::Ok => {
                info!(provider = %p.name, "health watcher: token expiry resolved");
            }
        }
    }
}

fn classify_token(remaining: chrono::Duration, threshold: chrono::Duration) -> TokenState {
    if remaining <= chrono::Duration::zero() {
        TokenState::Expired
    } else if remaining < threshold {
        TokenState::Warning
    } else {
        TokenState::Ok
    }
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: i64,
}

/// Extract the `exp` claim from a JWT without verifying the signature — the
/// watcher observes the expiry only.
pub fn decode_jwt_expiry(token: &str) -> Result<DateTime<Utc>> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(Error::internal("not a JWT"));
    }
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|e| Error::internal(format!("decode JWT payload: {e}")))?;
    let claims: Claims = serde_json::from_slice(&payload)
        .map_err(|e| Error::internal(format!("unmarshal JWT claims: {e}")))?;
    if claims.exp == 0 {
        return Err(Error::internal("no exp claim"));
    }
    DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| Error::internal("exp claim out of range"))
}
