//! Structured reference strings.
//!
//! A reference string is a run of powers of a secret `tau` in G1 plus `tau` in
//! G2. Providers hand out exactly the number of points a session asks for.

use ark_bn254::{Fr, G1Affine, G1Projective, G2Affine, G2Projective};
use ark_ec::{CurveGroup, Group};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_std::rand::{rngs::StdRng, SeedableRng};
use ark_std::UniformRand;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info};

/// Uncompressed size of one G1 point
pub const G1_POINT_SIZE: usize = 64;
/// Uncompressed size of the G2 point
pub const G2_POINT_SIZE: usize = 128;

#[derive(Error, Debug)]
pub enum SrsError {
    #[error("Reference string has {available} points, {required} required")]
    InsufficientPoints { required: u32, available: u32 },

    #[error("Malformed reference string: {0}")]
    Malformed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Reference string generation task failed: {0}")]
    Task(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Crs {
    g1: Vec<G1Affine>,
    g2: G2Affine,
}

impl Crs {
    /// Deterministic powers of tau for development use.
    ///
    /// Anyone who knows `seed` knows tau; never use this for real deployments.
    pub fn generate(seed: u64, num_points: u32) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let tau = Fr::rand(&mut rng);

        let mut power = Fr::from(1u64);
        let mut projective = Vec::with_capacity(num_points as usize);
        for _ in 0..num_points {
            projective.push(G1Projective::generator() * power);
            power *= tau;
        }

        Self {
            g1: G1Projective::normalize_batch(&projective),
            g2: (G2Projective::generator() * tau).into_affine(),
        }
    }

    /// Rebuild from the raw buffers handed to a backend
    pub fn from_parts(g1_data: &[u8], num_points: u32, g2_data: &[u8]) -> Result<Self, SrsError> {
        let expected = num_points as usize * G1_POINT_SIZE;
        if g1_data.len() != expected {
            return Err(SrsError::Malformed(format!(
                "G1 buffer is {} bytes, expected {} for {} points",
                g1_data.len(),
                expected,
                num_points
            )));
        }
        let g1 = g1_data
            .chunks_exact(G1_POINT_SIZE)
            .map(G1Affine::deserialize_uncompressed)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SrsError::Malformed(e.to_string()))?;
        let g2 = G2Affine::deserialize_uncompressed(g2_data)
            .map_err(|e| SrsError::Malformed(e.to_string()))?;
        Ok(Self { g1, g2 })
    }

    pub fn num_points(&self) -> u32 {
        self.g1.len() as u32
    }

    pub fn g1_points(&self) -> &[G1Affine] {
        &self.g1
    }

    pub fn g2_point(&self) -> &G2Affine {
        &self.g2
    }

    /// Concatenated uncompressed G1 points
    pub fn g1_data(&self) -> Result<Vec<u8>, SrsError> {
        let mut bytes = Vec::with_capacity(self.g1.len() * G1_POINT_SIZE);
        for point in &self.g1 {
            point
                .serialize_uncompressed(&mut bytes)
                .map_err(|e| SrsError::Malformed(e.to_string()))?;
        }
        Ok(bytes)
    }

    pub fn g2_data(&self) -> Result<Vec<u8>, SrsError> {
        let mut bytes = Vec::with_capacity(G2_POINT_SIZE);
        self.g2
            .serialize_uncompressed(&mut bytes)
            .map_err(|e| SrsError::Malformed(e.to_string()))?;
        Ok(bytes)
    }

    /// Keep only the first `num_points` G1 points
    pub fn truncate(mut self, num_points: u32) -> Result<Self, SrsError> {
        if self.num_points() < num_points {
            return Err(SrsError::InsufficientPoints {
                required: num_points,
                available: self.num_points(),
            });
        }
        self.g1.truncate(num_points as usize);
        Ok(self)
    }

    /// Compressed transcript file format: G1 vector followed by the G2 point
    pub fn to_bytes(&self) -> Result<Vec<u8>, SrsError> {
        let mut bytes = Vec::new();
        self.g1
            .serialize_compressed(&mut bytes)
            .map_err(|e| SrsError::Malformed(e.to_string()))?;
        self.g2
            .serialize_compressed(&mut bytes)
            .map_err(|e| SrsError::Malformed(e.to_string()))?;
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SrsError> {
        let mut reader = bytes;
        let g1 = Vec::<G1Affine>::deserialize_compressed(&mut reader)
            .map_err(|e| SrsError::Malformed(e.to_string()))?;
        let g2 = G2Affine::deserialize_compressed(&mut reader)
            .map_err(|e| SrsError::Malformed(e.to_string()))?;
        Ok(Self { g1, g2 })
    }
}

/// Source of reference strings.
///
/// Fetching may be slow (disk or network); it either yields the full string or fails.
#[async_trait]
pub trait SrsProvider: Send + Sync {
    async fn fetch(&self, num_points: u32) -> Result<Crs, SrsError>;
}

/// Generates a deterministic reference string from a seed
#[derive(Debug, Clone)]
pub struct DevSrsProvider {
    seed: u64,
}

impl DevSrsProvider {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }
}

#[async_trait]
impl SrsProvider for DevSrsProvider {
    async fn fetch(&self, num_points: u32) -> Result<Crs, SrsError> {
        let seed = self.seed;
        debug!("Generating development reference string with {} points", num_points);
        tokio::task::spawn_blocking(move || Crs::generate(seed, num_points))
            .await
            .map_err(|e| SrsError::Task(e.to_string()))
    }
}

/// Reads a transcript written by [`Crs::to_bytes`] and truncates it to size
#[derive(Debug, Clone)]
pub struct FileSrsProvider {
    path: PathBuf,
}

impl FileSrsProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SrsProvider for FileSrsProvider {
    async fn fetch(&self, num_points: u32) -> Result<Crs, SrsError> {
        info!("Loading reference string from {}", self.path.display());
        let bytes = tokio::fs::read(&self.path).await?;
        let crs = tokio::task::spawn_blocking(move || Crs::from_bytes(&bytes))
            .await
            .map_err(|e| SrsError::Task(e.to_string()))??;
        crs.truncate(num_points)
    }
}
