use serde::{Deserialize, Serialize};

/// Number of landmarks in the BlazePose body layout.
pub const POSE_LANDMARK_COUNT: usize = 33;

/// A single body keypoint in normalized image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub z: f64,
    /// Per-point confidence in [0.0, 1.0].
    #[serde(default)]
    pub visibility: f64,
}

impl Landmark {
    pub fn new(x: f64, y: f64, z: f64, visibility: f64) -> Self {
        Self { x, y, z, visibility }
    }
}

/// BlazePose landmark indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseLandmark {
    Nose = 0,
    LeftEyeInner = 1,
    LeftEye = 2,
    LeftEyeOuter = 3,
    RightEyeInner = 4,
    RightEye = 5,
    RightEyeOuter = 6,
    LeftEar = 7,
    RightEar = 8,
    MouthLeft = 9,
    MouthRight = 10,
    LeftShoulder = 11,
    RightShoulder = 12,
    LeftElbow = 13,
    RightElbow = 14,
    LeftWrist = 15,
    RightWrist = 16,
    LeftPinky = 17,
    RightPinky = 18,
    LeftIndex = 19,
    RightIndex = 20,
    LeftThumb = 21,
    RightThumb = 22,
    LeftHip = 23,
    RightHip = 24,
    LeftKnee = 25,
    RightKnee = 26,
    LeftAnkle = 27,
    RightAnkle = 28,
    LeftHeel = 29,
    RightHeel = 30,
    LeftFootIndex = 31,
    RightFootIndex = 32,
}

impl From<PoseLandmark> for usize {
    fn from(landmark: PoseLandmark) -> usize {
        landmark as usize
    }
}

/// The full ordered landmark set for one detected body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Landmark>", into = "Vec<Landmark>")]
pub struct PoseLandmarkSet {
    landmarks: Vec<Landmark>,
}

impl PoseLandmarkSet {
    pub fn get(&self, landmark: PoseLandmark) -> &Landmark {
        &self.landmarks[usize::from(landmark)]
    }

    pub fn left_shoulder(&self) -> &Landmark {
        self.get(PoseLandmark::LeftShoulder)
    }

    pub fn left_hip(&self) -> &Landmark {
        self.get(PoseLandmark::LeftHip)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.iter()
    }
}

impl TryFrom<Vec<Landmark>> for PoseLandmarkSet {
    type Error = String;

    fn try_from(landmarks: Vec<Landmark>) -> Result<Self, Self::Error> {
        if landmarks.len() != POSE_LANDMARK_COUNT {
            return Err(format!(
                "Invalid landmark count: {}. Expected {}.",
                landmarks.len(),
                POSE_LANDMARK_COUNT
            ));
        }
        Ok(Self { landmarks })
    }
}

impl From<PoseLandmarkSet> for Vec<Landmark> {
    fn from(set: PoseLandmarkSet) -> Self {
        set.landmarks
    }
}
