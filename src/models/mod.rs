use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Lifecycle of a 3D generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub const ALL: [JobStatus; 4] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// `Processing -> Queued` only happens when a worker recovers jobs
    /// abandoned by a previous process.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Processing)
                | (JobStatus::Queued, JobStatus::Error)
                | (JobStatus::Processing, JobStatus::Completed)
                | (JobStatus::Processing, JobStatus::Error)
                | (JobStatus::Processing, JobStatus::Queued)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown job status '{0}'")]
pub struct UnknownJobStatus(pub String);

impl FromStr for JobStatus {
    type Err = UnknownJobStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownJobStatus(s.to_string()))
    }
}

/// Lifecycle tag carried by an uploaded image record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    Uploaded,
    PosePrepared,
    Reconstructed,
}

impl ImageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageStatus::Uploaded => "uploaded",
            ImageStatus::PosePrepared => "pose_prepared",
            ImageStatus::Reconstructed => "reconstructed",
        }
    }
}

/// Pose estimation flavour requested by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum PoseMethod {
    Openpose,
    Lightweight,
}

impl PoseMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoseMethod::Openpose => "openpose",
            PoseMethod::Lightweight => "lightweight",
        }
    }

    /// Whether the method yields named keypoints rather than an opaque
    /// representation consumed by the reconstruction stage.
    pub fn produces_keypoints(&self) -> bool {
        matches!(self, PoseMethod::Openpose)
    }
}

impl FromStr for PoseMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openpose" => Ok(PoseMethod::Openpose),
            "lightweight" => Ok(PoseMethod::Lightweight),
            other => Err(anyhow::anyhow!("unknown pose method '{}'", other)),
        }
    }
}

/// Coordinate data as produced by the pose service. Kept as opaque JSON:
/// named 2D landmarks, OpenPose flat `[x, y, c, ...]` arrays and 3D joints
/// all pass through to the reconstruction stage untouched.
pub type Keypoints = serde_json::Value;
