//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
}

pub mod global {
    /// Remote grant endpoint: answers 200 once a global unit is granted
    pub const GLOBAL: &str = "/nirn/global";
    pub const MEMBERS: &str = "/nirn/members";
}
