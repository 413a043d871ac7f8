//! NVLink domain types

use serde::Serialize;

/// Highest number of links any device exposes
pub const MAX_LINKS: u32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NvLinkState {
    pub link: u32,
    pub active: bool,
}

/// Per-link state; empty on devices without NVLink
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NvLink {
    pub uuid: String,
    pub states: Vec<NvLinkState>,
}

impl NvLink {
    pub fn supported(&self) -> bool {
        !self.states.is_empty()
    }

    pub fn inactive_links(&self) -> Vec<u32> {
        self.states
            .iter()
            .filter(|s| !s.active)
            .map(|s| s.link)
            .collect()
    }
}
