//! Band catalog panel: lists the bands and turns a selection into a band
//! visualization.

use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use super::ActionOutcome;
use crate::backend::Backend;
use crate::notifications::Notifications;
use crate::protocol::{BandCatalog, BandId, band_visualization_path};
use crate::session::{Session, Visualization};

/// One selectable row of the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub id: BandId,
    pub label: String,
    pub selected: bool,
}

pub struct CatalogPanel<B> {
    backend: Arc<B>,
    session: Session,
    notifications: Notifications,
    bands: Mutex<BandCatalog>,
    selected: Mutex<Option<BandId>>,
}

impl<B: Backend> CatalogPanel<B> {
    pub fn new(backend: Arc<B>, session: Session, notifications: Notifications) -> Self {
        Self {
            backend,
            session,
            notifications,
            bands: Mutex::new(BandCatalog::new()),
            selected: Mutex::new(None),
        }
    }

    /// Fetch the band list. On failure the list stays empty and a
    /// notification is raised; there is no retry.
    pub async fn load_catalog(&self) -> bool {
        match self.backend.list_bands().await {
            Ok(catalog) => {
                info!(target: "catalog", bands = catalog.len(), "catalog loaded");
                *self.bands.lock().unwrap() = catalog;
                true
            }
            Err(e) => {
                self.notifications.failure("load band catalog", &e);
                false
            }
        }
    }

    /// Select `band`, convert it on the backend and show it.
    ///
    /// The selection itself is recorded immediately. The visualization is
    /// only replaced once conversion succeeds, and only if no newer
    /// visualization request was issued in the meantime.
    pub async fn select_band(&self, band: BandId) -> ActionOutcome {
        *self.selected.lock().unwrap() = Some(band.clone());
        self.session.set_selected_band(band.clone());

        let ticket = self.session.begin_visualization();
        debug!(target: "catalog", band = %band, ticket = ticket.value(), "converting band");

        match self.backend.convert_band(&band).await {
            Ok(receipt) => {
                if let Some(message) = receipt.message {
                    debug!(target: "catalog", band = %band, "{}", message);
                }
                let applied = self.session.publish_visualization(
                    ticket,
                    Visualization::band(band_visualization_path(&band)),
                );
                ActionOutcome::from_publish(applied)
            }
            Err(e) => {
                self.notifications.failure(&format!("convert {band}"), &e);
                ActionOutcome::Failed
            }
        }
    }

    pub fn bands(&self) -> BandCatalog {
        self.bands.lock().unwrap().clone()
    }

    pub fn selected(&self) -> Option<BandId> {
        self.selected.lock().unwrap().clone()
    }

    /// One entry per catalog band, labelled with its description,
    /// wavelength and dimensions.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        let selected = self.selected();
        self.bands
            .lock()
            .unwrap()
            .iter()
            .map(|(id, d)| CatalogEntry {
                id: id.clone(),
                label: format!("{}: {} ({}, {})", id, d.description, d.wavelength, d.dimensions),
                selected: selected.as_ref() == Some(id),
            })
            .collect()
    }
}
