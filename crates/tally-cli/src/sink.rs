//! Blocking adapter that delivers records through the async Notion client.

use anyhow::Context;
use tally_core::{DeliveryRecord, Sink};
use tally_notion::{Client, NotionError, PeriodPage, PropertyNames};

use crate::config::{Config, NotionCredentials};

/// Delivers each record as a Notion page, one request at a time.
#[derive(Debug)]
pub struct NotionSink {
    client: Client,
    runtime: tokio::runtime::Runtime,
    database_id: String,
    properties: PropertyNames,
}

impl NotionSink {
    pub fn new(config: &Config, credentials: NotionCredentials) -> anyhow::Result<Self> {
        let client = Client::new(credentials.token)
            .context("failed to create Notion client")?
            .with_base_url(&config.notion_base_url);
        let runtime =
            tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;

        Ok(Self {
            client,
            runtime,
            database_id: credentials.database_id,
            properties: config.property_names(),
        })
    }
}

impl Sink for NotionSink {
    type Error = NotionError;

    fn create(&mut self, record: &DeliveryRecord) -> Result<(), Self::Error> {
        let page = PeriodPage::from(record);
        let page_id = self.runtime.block_on(self.client.create_page(
            &self.database_id,
            &self.properties,
            &page,
        ))?;
        tracing::debug!(%page_id, title = %record.title, "period written to Notion");
        Ok(())
    }
}
