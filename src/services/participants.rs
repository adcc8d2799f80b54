//! Participant records kept in a JSON file next to the project.
use super::{Participant, ParticipantStore, PaymentState};
use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct JsonParticipantStore {
    path: PathBuf,
}

impl JsonParticipantStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record; a missing file means no participants yet.
    pub fn load(&self) -> Result<Vec<Participant>> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        let bytes = fs::read(&self.path)
            .with_context(|| format!("read participants {}", self.path.display()))?;
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parse participants JSON {}", self.path.display()))
    }

    fn save(&self, records: &[Participant]) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let text = serde_json::to_string_pretty(records).context("serialize participants")?;
        let mut staged = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("stage participants in {}", parent.display()))?;
        staged
            .write_all(text.as_bytes())
            .context("write staged participants")?;
        staged
            .persist(&self.path)
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }
}

impl ParticipantStore for JsonParticipantStore {
    fn find_by_assignment(&self, assignment_id: &str) -> Result<Participant> {
        self.load()?
            .into_iter()
            .find(|participant| participant.assignment_id == assignment_id)
            .ok_or_else(|| anyhow!("no participant record for assignment {assignment_id}"))
    }

    fn set_payment_state(&mut self, assignment_id: &str, state: PaymentState) -> Result<()> {
        let mut records = self.load()?;
        let record = records
            .iter_mut()
            .find(|participant| participant.assignment_id == assignment_id)
            .ok_or_else(|| anyhow!("no participant record for assignment {assignment_id}"))?;
        record.payment = state;
        self.save(&records)?;
        tracing::debug!(%assignment_id, ?state, "payment state recorded");
        Ok(())
    }
}
