//! Device registry: known terminals, their liveness, and auto-registration.

use std::sync::Arc;

use serde_json::json;
use timekeep_core::db::unix_timestamp;

use crate::error::EngineError;
use crate::observe::{EngineEvent, EngineObserver};
use crate::storage::{
    AuditCategory, AuditEntry, Database, DatabaseError, Resolved, Terminal, TerminalStatus,
    append_audit, insert_terminal_if_absent,
};

/// Tracks terminals and registers unseen serials on first contact.
#[derive(Clone)]
pub struct DeviceRegistry {
    db: Database,
    observer: Arc<dyn EngineObserver>,
    offline_after_secs: i64,
}

impl DeviceRegistry {
    pub fn new(db: Database, observer: Arc<dyn EngineObserver>, offline_after_secs: i64) -> Self {
        Self {
            db,
            observer,
            offline_after_secs,
        }
    }

    /// Look up a terminal by serial, registering it if unknown.
    ///
    /// Contact from a known terminal refreshes its liveness. That refresh is
    /// best effort: a failure is reported to the observer and the lookup
    /// still succeeds.
    pub async fn resolve_or_register(
        &self,
        serial: &str,
        ip_address: Option<&str>,
    ) -> Result<Resolved<Terminal>, EngineError> {
        let serial = serial.trim();
        if serial.is_empty() {
            return Err(EngineError::InvalidInput("terminal serial is empty".into()));
        }

        let unavailable = |source: DatabaseError| EngineError::TerminalUnavailable {
            serial: serial.to_string(),
            source,
        };

        if let Some(terminal) = self
            .db
            .find_terminal_by_serial(serial)
            .await
            .map_err(unavailable)?
        {
            return Ok(Resolved::Existing(self.touch(terminal, ip_address).await));
        }

        let resolved = self
            .register(serial, ip_address)
            .await
            .map_err(unavailable)?;

        match resolved {
            Resolved::Created(terminal) => {
                self.observer.record(&EngineEvent::TerminalRegistered {
                    serial: terminal.serial_number.clone(),
                    ip_address: terminal.ip_address.clone(),
                });
                Ok(Resolved::Created(terminal))
            }
            // Another caller registered the serial between our lookup and insert.
            Resolved::Existing(terminal) => {
                Ok(Resolved::Existing(self.touch(terminal, ip_address).await))
            }
        }
    }

    async fn register(
        &self,
        serial: &str,
        ip_address: Option<&str>,
    ) -> Result<Resolved<Terminal>, DatabaseError> {
        let mut tx = self.db.pool().begin().await?;

        let resolved = insert_terminal_if_absent(&mut *tx, serial, ip_address).await?;
        if let Resolved::Created(terminal) = &resolved {
            append_audit(
                &mut *tx,
                terminal.id,
                AuditCategory::Registration,
                &format!("New terminal auto-registered: {serial}"),
                &json!({ "ip_address": ip_address }),
            )
            .await?;
        }

        tx.commit().await?;
        Ok(resolved)
    }

    async fn touch(&self, mut terminal: Terminal, ip_address: Option<&str>) -> Terminal {
        let now = unix_timestamp();
        match self.db.touch_terminal(terminal.id, ip_address, now).await {
            Ok(()) => {
                terminal.last_seen = Some(now);
                terminal.status = TerminalStatus::Online;
                if let Some(ip) = ip_address {
                    terminal.ip_address = Some(ip.to_string());
                }
            }
            Err(e) => self.observer.record(&EngineEvent::LivenessUpdateFailed {
                serial: terminal.serial_number.clone(),
                error: e.to_string(),
            }),
        }
        terminal
    }

    /// Get a terminal that must already exist. `entity` names the role of
    /// the terminal in the not-found error.
    pub async fn require(&self, serial: &str, entity: &'static str) -> Result<Terminal, EngineError> {
        self.db
            .find_terminal_by_serial(serial)
            .await?
            .ok_or_else(|| EngineError::not_found(entity, serial))
    }

    /// Heartbeat from a terminal. Registers it if unknown.
    pub async fn ping(
        &self,
        serial: &str,
        ip_address: Option<&str>,
    ) -> Result<Terminal, EngineError> {
        let terminal = self.resolve_or_register(serial, ip_address).await?.into_inner();
        self.db
            .append_audit(
                terminal.id,
                AuditCategory::Ping,
                "Terminal ping",
                &json!({ "ip_address": ip_address }),
            )
            .await?;
        Ok(terminal)
    }

    /// Set a terminal's operational status and audit the change.
    pub async fn set_status(
        &self,
        serial: &str,
        status: TerminalStatus,
    ) -> Result<Terminal, EngineError> {
        let terminal = self.require(serial, "terminal").await?;
        if terminal.status == status {
            return Ok(terminal);
        }

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("UPDATE terminals SET status = ? WHERE id = ?")
            .bind(status)
            .bind(terminal.id)
            .execute(&mut *tx)
            .await?;
        append_audit(
            &mut *tx,
            terminal.id,
            AuditCategory::StatusChange,
            &format!("Status changed from {} to {status}", terminal.status),
            &json!({ "from": terminal.status.as_str(), "to": status.as_str() }),
        )
        .await?;
        tx.commit().await?;

        Ok(Terminal { status, ..terminal })
    }

    /// Take online terminals that have been silent longer than the
    /// configured threshold offline. Returns how many changed.
    pub async fn mark_stale_offline(&self, now: i64) -> Result<u64, EngineError> {
        let cutoff = now - self.offline_after_secs;
        Ok(self.db.mark_stale_terminals_offline(cutoff).await?)
    }

    pub async fn list_terminals(
        &self,
        status: Option<TerminalStatus>,
    ) -> Result<Vec<Terminal>, EngineError> {
        Ok(self.db.list_terminals(status).await?)
    }

    /// Most recent audit entries for a terminal.
    pub async fn terminal_logs(
        &self,
        serial: &str,
        limit: u32,
    ) -> Result<Vec<AuditEntry>, EngineError> {
        let terminal = self.require(serial, "terminal").await?;
        Ok(self.db.list_audit(terminal.id, limit).await?)
    }
}
