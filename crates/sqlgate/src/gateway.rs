//! Gateway entry point

use sqlgate_core::{DatabaseDriver, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::call_text::PayloadBinding;
use crate::connection::DbConnection;
use crate::guard::CallGuard;
use crate::settings::GatewaySettings;

/// Runs statements and procedure calls through one driver.
///
/// Cheap to clone; clones share the driver, settings and cancellation token.
#[derive(Clone)]
pub struct Gateway {
    driver: Arc<dyn DatabaseDriver>,
    settings: Arc<GatewaySettings>,
    timeout: Option<Duration>,
    cancel: Option<CancellationToken>,
    payload_binding: PayloadBinding,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("driver", &self.driver.name())
            .field("timeout", &self.timeout)
            .field("payload_binding", &self.payload_binding)
            .finish()
    }
}

impl Gateway {
    pub fn new(driver: Arc<dyn DatabaseDriver>) -> Self {
        Self {
            driver,
            settings: Arc::new(GatewaySettings::default()),
            timeout: None,
            cancel: None,
            payload_binding: PayloadBinding::default(),
        }
    }

    /// Use `settings` for connection string lookup and the default deadline
    pub fn with_settings(mut self, settings: GatewaySettings) -> Self {
        if self.timeout.is_none() {
            self.timeout = settings.command_timeout();
        }
        self.settings = Arc::new(settings);
        self
    }

    /// Deadline applied to every blocking step of a call
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Interrupt in-flight calls when `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn with_payload_binding(mut self, binding: PayloadBinding) -> Self {
        self.payload_binding = binding;
        self
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn driver(&self) -> &Arc<dyn DatabaseDriver> {
        &self.driver
    }

    pub(crate) fn payload_binding(&self) -> PayloadBinding {
        self.payload_binding
    }

    /// Look up a named connection string; `""` selects the default name
    pub fn connect_string(&self, name: &str) -> Result<String> {
        self.settings.get_connect_string(name)
    }

    /// An unopened connection the caller owns
    pub fn connection(&self, connection_string: impl Into<String>) -> DbConnection {
        DbConnection::new(Arc::clone(&self.driver), connection_string)
    }

    /// The guard for calls made with `connection_string`.
    ///
    /// An explicit or configured timeout wins over one carried by the
    /// connection string itself.
    pub fn guard_for(&self, connection_string: &str) -> CallGuard {
        let deadline = self
            .timeout
            .or_else(|| self.driver.command_timeout(connection_string));
        CallGuard::new(deadline, self.cancel.clone())
    }
}
