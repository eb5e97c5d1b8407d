use crate::models::ViewpointLabel;
use serde::Serialize;
use std::fmt;

/// 分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Accepted,
    Rejected,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Accepted => "accepted",
            Outcome::Rejected => "rejected",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单次校验的判定
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    /// 通过或拒绝
    #[serde(rename = "status")]
    pub outcome: Outcome,
    /// 模型给出的概率
    pub score: f32,
    /// 可直接展示给用户的说明
    pub message: String,
}

impl Verdict {
    /// 固定阈值判定，等于阈值时判为拒绝
    pub fn from_score(label: ViewpointLabel, score: f32, threshold: f32) -> Self {
        let outcome = if score > threshold {
            Outcome::Accepted
        } else {
            Outcome::Rejected
        };

        let message = match outcome {
            Outcome::Accepted => format!("Photo accepted as '{}' view", label),
            Outcome::Rejected => format!(
                "Photo does not show the '{}' view, please try again",
                label
            ),
        };

        Self {
            outcome,
            score,
            message,
        }
    }
}
