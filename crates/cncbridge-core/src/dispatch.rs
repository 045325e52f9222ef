// ── Tag pack resolution and read dispatch ──
//
// A pack is resolved once into the deduplicated, ordered list of reading
// accessors it needs. Each poll cycle runs that list against one handle and
// folds the results into an output record.

use std::collections::BTreeMap;

use cncbridge_driver::reading::ERRORS_TAG;
use cncbridge_driver::{
    Accessor, Driver, Handle, Reading, ReadingId, Status, StatusClass, StatusPolicy,
};
use tracing::{debug, trace};

use crate::error::CoreError;
use crate::model::{Device, OutputRecord, TagName, TagPack};

/// A tag pack resolved against the reading catalogue.
#[derive(Debug, Clone)]
pub struct ReadPlan {
    pack: String,
    steps: Vec<(ReadingId, Accessor)>,
    wants_errors: bool,
}

impl ReadPlan {
    /// Resolve every declared tag to a reading identifier. Unknown names,
    /// identifiers the driver cannot serve and subkeys of scalar readings
    /// are rejected here rather than skipped at poll time.
    pub fn resolve(pack_name: &str, pack: &TagPack, driver: &dyn Driver) -> Result<Self, CoreError> {
        let mut steps: Vec<(ReadingId, Accessor)> = Vec::new();
        let mut wants_errors = false;

        for full in pack.keys() {
            let tag = TagName::parse(full);
            if tag.reading() == ERRORS_TAG {
                wants_errors = true;
                continue;
            }

            let id = ReadingId::parse(tag.reading()).map_err(|_| CoreError::UnknownTag {
                pack: pack_name.to_owned(),
                tag: full.clone(),
            })?;
            if !driver.supports(id) {
                return Err(CoreError::UnsupportedTag {
                    pack: pack_name.to_owned(),
                    tag: full.clone(),
                    driver: driver.name().to_owned(),
                });
            }
            if tag.subkey().is_some() && !id.is_map() {
                return Err(CoreError::NotAMap {
                    pack: pack_name.to_owned(),
                    tag: full.clone(),
                });
            }
            if !steps.iter().any(|(seen, _)| *seen == id) {
                steps.push((id, id.accessor()));
            }
        }

        debug!(pack = pack_name, readings = steps.len(), wants_errors, "tag pack resolved");
        Ok(Self {
            pack: pack_name.to_owned(),
            steps,
            wants_errors,
        })
    }

    pub fn pack(&self) -> &str {
        &self.pack
    }

    /// Resolved identifiers in dispatch order.
    pub fn readings(&self) -> impl Iterator<Item = ReadingId> + '_ {
        self.steps.iter().map(|(id, _)| *id)
    }

    pub fn wants_errors(&self) -> bool {
        self.wants_errors
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// How a cycle went, as far as reconnect escalation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleVerdict {
    /// Every resolved reading returned status 0.
    Clean,
    /// Some readings failed with non-fatal statuses.
    Degraded,
    /// Dispatch stopped on a session-fatal status.
    Fatal(Status),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
    pub record: OutputRecord,
    pub verdict: CycleVerdict,
}

/// Run one read cycle for `device` over `handle`. Blocking: call it from the
/// blocking pool.
///
/// Readings with a non-zero status are left out of the record. A fatal status
/// stops the cycle; identifiers after it are neither read nor reported.
pub fn read_cycle(
    plan: &ReadPlan,
    driver: &dyn Driver,
    handle: Handle,
    device: &Device,
    policy: &StatusPolicy,
) -> CycleOutcome {
    let mut record = OutputRecord::powered(device);
    let mut errors: BTreeMap<String, i64> = BTreeMap::new();
    let mut verdict = CycleVerdict::Clean;

    for (id, accessor) in &plan.steps {
        let status = match accessor(driver, handle) {
            Ok(reading) => {
                record.tags.insert(id.as_str().to_owned(), reading);
                Status::OK
            }
            Err(status) => status,
        };
        errors.insert(id.as_str().to_owned(), i64::from(status.code()));

        match policy.classify(status) {
            StatusClass::Ok => {}
            StatusClass::Transient => {
                trace!(device = %device.name, reading = %id, %status, "reading skipped");
                verdict = CycleVerdict::Degraded;
            }
            StatusClass::Fatal => {
                debug!(device = %device.name, reading = %id, %status, "cycle aborted");
                verdict = CycleVerdict::Fatal(status);
                break;
            }
        }
    }

    if plan.wants_errors {
        record
            .tags
            .insert(ERRORS_TAG.to_owned(), Reading::MapInt(errors));
    }

    CycleOutcome { record, verdict }
}
