//! Matrix Factorization Model Persistence
//!
//! Stores trained latent factors as a single bincode file:
//! - both factor matrices flattened row-major with their shapes
//! - the ordered user and item id lists that index the matrix rows
//! - a format version so stale layouts are rejected instead of misread
//!
//! Writes go to a sibling temporary file that is renamed into place, so a
//! reader never sees a half-written snapshot.

use crate::matrix_factorization::LatentFactors;
use filmrec_core::{ItemId, RecommenderError, Result, UserId};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;

const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Serializable representation of trained latent factors
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    format_version: u32,
    factors: usize,
    user_ids: Vec<UserId>,
    item_ids: Vec<ItemId>,
    user_factors_shape: (usize, usize),
    user_factors_data: Vec<f64>,
    item_factors_shape: (usize, usize),
    item_factors_data: Vec<f64>,
}

impl ModelSnapshot {
    pub fn from_factors(factors: &LatentFactors) -> Self {
        let user_factors = factors.user_factors();
        let item_factors = factors.item_factors();

        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            factors: factors.factors(),
            user_ids: factors.user_ids().to_vec(),
            item_ids: factors.item_ids().to_vec(),
            user_factors_shape: (user_factors.nrows(), user_factors.ncols()),
            user_factors_data: user_factors.iter().copied().collect(),
            item_factors_shape: (item_factors.nrows(), item_factors.ncols()),
            item_factors_data: item_factors.iter().copied().collect(),
        }
    }

    /// Rebuild factors, with index maps in the order the ids were saved
    pub fn into_factors(self) -> Result<LatentFactors> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(RecommenderError::Snapshot(format!(
                "unsupported snapshot format version {} (expected {})",
                self.format_version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        if self.user_factors_shape.1 != self.factors || self.item_factors_shape.1 != self.factors {
            return Err(RecommenderError::Snapshot(format!(
                "factor count {} disagrees with matrix shapes {:?} / {:?}",
                self.factors, self.user_factors_shape, self.item_factors_shape
            )));
        }

        let user_factors = Array2::from_shape_vec(self.user_factors_shape, self.user_factors_data)
            .map_err(|e| {
                RecommenderError::Snapshot(format!("failed to reconstruct user factors: {}", e))
            })?;
        let item_factors = Array2::from_shape_vec(self.item_factors_shape, self.item_factors_data)
            .map_err(|e| {
                RecommenderError::Snapshot(format!("failed to reconstruct item factors: {}", e))
            })?;

        LatentFactors::from_parts(user_factors, item_factors, self.user_ids, self.item_ids)
    }
}

/// File-backed snapshot storage for the matrix factorization model
#[derive(Debug, Clone)]
pub struct ModelStorage {
    path: PathBuf,
}

impl ModelStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist factors, returning the snapshot size in bytes
    ///
    /// # Errors
    /// Returns error if:
    /// - The parent directory cannot be created
    /// - Serialization fails
    /// - Writing or renaming the file fails
    pub fn save(&self, factors: &LatentFactors) -> Result<u64> {
        let start = Instant::now();

        let snapshot = ModelSnapshot::from_factors(factors);
        let bytes = bincode::serialize(&snapshot).map_err(|e| {
            RecommenderError::Snapshot(format!("failed to serialize model snapshot: {}", e))
        })?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        fs::write(&tmp_path, &bytes)?;
        fs::rename(&tmp_path, &self.path)?;

        let size_bytes = bytes.len() as u64;
        tracing::debug!(
            "Saved model snapshot to {} in {:?} ({} bytes)",
            self.path.display(),
            start.elapsed(),
            size_bytes
        );

        Ok(size_bytes)
    }

    /// Load persisted factors
    ///
    /// `Ok(None)` when no snapshot exists; an error when one exists but
    /// cannot be decoded.
    pub fn load(&self) -> Result<Option<LatentFactors>> {
        let start = Instant::now();

        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: ModelSnapshot = bincode::deserialize(&bytes).map_err(|e| {
            RecommenderError::Snapshot(format!("failed to deserialize model snapshot: {}", e))
        })?;
        let factors = snapshot.into_factors()?;

        tracing::debug!(
            "Loaded model snapshot from {} in {:?} ({} bytes)",
            self.path.display(),
            start.elapsed(),
            bytes.len()
        );

        Ok(Some(factors))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn delete(&self) -> Result<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
