use bidbell::{
    CoordinatorState, DeliveryCoordinator, NotificationActions, RestClient, SnapshotLoader,
    StaticTokenProvider,
};
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::output::Printer;

pub struct CommandExecutor {
    config: AppConfig,
    printer: Printer,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, printer: Printer) -> Self {
        Self { config, printer }
    }

    fn auth(&self) -> Result<Arc<StaticTokenProvider>> {
        Ok(Arc::new(StaticTokenProvider::new(self.config.token()?)))
    }

    fn rest(&self) -> Result<RestClient> {
        let client = &self.config.client;
        Ok(RestClient::new(
            client.rest_url()?,
            self.auth()?,
            client.request_timeout(),
        )?)
    }

    pub async fn list(&self, limit: Option<u32>) -> Result<()> {
        let limit = limit.unwrap_or(self.config.client.snapshot_limit);
        let snapshot = self.rest()?.fetch(limit).await?;
        println!("{}", self.printer.notifications(&snapshot));
        Ok(())
    }

    pub async fn read(&self, id: &str) -> Result<()> {
        self.rest()?.mark_read(id).await?;
        println!("{}", self.printer.confirmation("marked read", Some(id)));
        Ok(())
    }

    pub async fn read_all(&self) -> Result<()> {
        self.rest()?.mark_all_read().await?;
        println!("{}", self.printer.confirmation("marked all read", None));
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.rest()?.delete(id).await?;
        println!("{}", self.printer.confirmation("deleted", Some(id)));
        Ok(())
    }

    pub fn show_config(&self) -> Result<()> {
        print!("{}", self.config.show()?);
        Ok(())
    }

    /// Run a delivery session until Ctrl-C or until it stops on its own.
    pub async fn watch(&self, limit: Option<u32>, no_resync: bool) -> Result<()> {
        let mut client = self.config.client.clone();
        if let Some(limit) = limit {
            client.snapshot_limit = limit;
        }
        if no_resync {
            client.resync_on_reconnect = false;
        }

        let coordinator = DeliveryCoordinator::from_config(&client, self.auth()?)?;
        let printer = self.printer;
        let _subscription = coordinator.subscribe(move |change, view| {
            println!("{}", printer.change(change, view));
        });

        let mut status = coordinator.watch_status();
        coordinator.start()?;
        info!("Watching notifications, press Ctrl-C to stop");

        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                signal = &mut ctrl_c => {
                    signal?;
                    info!("Interrupted, stopping");
                    coordinator.stop().await;
                    return Ok(());
                }
                changed = status.changed() => {
                    if changed.is_err() {
                        return Ok(());
                    }
                    let current = status.borrow_and_update().clone();
                    println!("{}", printer.status(&current));

                    if let CoordinatorState::Stopped { reason } = &current.state {
                        if reason.is_error() {
                            return Err(AppError::SessionEnded(current.state.to_string()));
                        }
                        return Ok(());
                    }
                }
            }
        }
    }
}
