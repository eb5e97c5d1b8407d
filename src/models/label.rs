use crate::utils::error::ValidatorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 拍摄视角标签（封闭集合）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewpointLabel {
    Front,
    LeftSide,
    LeftSideMirror,
    Back,
    RightSide,
    RightSideMirror,
}

impl ViewpointLabel {
    pub const ALL: [ViewpointLabel; 6] = [
        ViewpointLabel::Front,
        ViewpointLabel::LeftSide,
        ViewpointLabel::LeftSideMirror,
        ViewpointLabel::Back,
        ViewpointLabel::RightSide,
        ViewpointLabel::RightSideMirror,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ViewpointLabel::Front => "front",
            ViewpointLabel::LeftSide => "leftSide",
            ViewpointLabel::LeftSideMirror => "leftSideMirror",
            ViewpointLabel::Back => "back",
            ViewpointLabel::RightSide => "rightSide",
            ViewpointLabel::RightSideMirror => "rightSideMirror",
        }
    }

    /// 默认模型文件名：`{label}_model.onnx`
    pub fn artifact_file_name(&self) -> String {
        format!("{}_model.onnx", self.as_str())
    }
}

impl fmt::Display for ViewpointLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewpointLabel {
    type Err = ValidatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViewpointLabel::ALL
            .iter()
            .copied()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| ValidatorError::UnknownLabel(s.to_string()))
    }
}
