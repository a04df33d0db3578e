use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::store::DocumentStore;
use crate::AirportCatalog;

#[derive(Debug, Clone, PartialEq)]
pub struct SystemProfile {
    pub logical_cores: usize,
    pub worker_threads: usize,
    pub strict_durability: bool, // true = fsync per append
}

impl SystemProfile {
    pub fn detect() -> Self {
        let cores = thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::for_cores(cores)
    }

    pub fn for_cores(cores: usize) -> Self {
        if cores <= 1 {
            // 1 compute + 1 I/O; fsync would stall the only core
            warn!(cores, "Single core detected, segment writes will not fsync");
            Self { logical_cores: cores, worker_threads: 2, strict_durability: false }
        } else {
            Self { logical_cores: cores, worker_threads: cores, strict_durability: true }
        }
    }
}

/// One maintenance pass: drop an expired popularity epoch, then compact the
/// segment once superseded frames outnumber live records.
pub fn run_maintenance(catalog: &AirportCatalog) -> bool {
    catalog.expire_popularity();

    let store = catalog.store();
    let (dead, live) = match (store.dead_entries(), store.len()) {
        (Ok(dead), Ok(live)) => (dead, live as u64),
        (Err(e), _) | (_, Err(e)) => {
            error!(error = %e, "Maintenance could not inspect the store");
            return false;
        }
    };

    if dead == 0 || dead <= live {
        debug!(dead, live, "Compaction not needed");
        return false;
    }

    match store.compact() {
        Ok(()) => {
            info!(dead, live, "Compacted airport segment");
            true
        }
        Err(e) => {
            error!(error = %e, "Compaction failed");
            false
        }
    }
}

/// Starts the background maintenance thread.
pub fn start_maintenance_thread(catalog: Arc<AirportCatalog>, interval: Duration) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        info!(interval_secs = interval.as_secs(), "Maintenance thread started");
        loop {
            thread::sleep(interval);
            run_maintenance(&catalog);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AirportInput, Location};
    use crate::ranking::ManualClock;
    use crate::store::AirportStore;
    use crate::CatalogConfig;

    fn input(code: &str) -> AirportInput {
        AirportInput {
            iata_code: Some(code.into()),
            name: Some(format!("{} Airport", code)),
            city: Some("Lyon, France".into()),
            location: Some(Location::point(4.94, 45.72)),
            ..Default::default()
        }
    }

    #[test]
    fn single_core_drops_fsync() {
        let profile = SystemProfile::for_cores(1);
        assert_eq!(profile.worker_threads, 2);
        assert!(!profile.strict_durability);
        assert!(SystemProfile::for_cores(8).strict_durability);
    }

    #[test]
    fn maintenance_expires_and_compacts() {
        let dir = tempfile::tempdir().unwrap();
        let store = AirportStore::open(&dir.path().join("airports.seg"), false).unwrap();
        let clock = Arc::new(ManualClock::default());
        let catalog = AirportCatalog::with_clock(store, CatalogConfig::default(), clock.clone());

        catalog.create(input("LYS")).unwrap();
        for code in ["AAA", "BBB", "CCC"] {
            catalog.create(input(code)).unwrap();
            catalog.delete(code).unwrap();
        }
        catalog.get("LYS").unwrap();
        clock.advance(CatalogConfig::default().popularity_ttl);

        assert!(run_maintenance(&catalog));
        assert!(catalog.popularity().is_empty());
        assert_eq!(catalog.store().dead_entries().unwrap(), 0);
        assert!(!run_maintenance(&catalog));
    }
}
