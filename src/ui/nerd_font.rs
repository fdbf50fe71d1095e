/// Icons used in growclone output.
///
/// Requires a terminal font with nerd font glyphs; JSON output never contains them
/// because callers only prefix human-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NerdFont {
    Check,
    Cross,
    Warning,
    Info,
    Question,
    Save,
    HardDrive,
    Partition,
    Search,
    Refresh,
    Wrench,
    Stop,
    ArrowRight,
}

impl NerdFont {
    pub const fn unicode(&self) -> char {
        match self {
            Self::Check => '\u{f00c}',      // fa-check
            Self::Cross => '\u{f00d}',      // fa-times
            Self::Warning => '\u{f071}',    // fa-exclamation-triangle
            Self::Info => '\u{f05a}',       // fa-info-circle
            Self::Question => '\u{f059}',   // fa-question-circle
            Self::Save => '\u{f0c7}',       // fa-save
            Self::HardDrive => '\u{f0a0}',  // fa-hdd-o
            Self::Partition => '\u{f1c0}',  // fa-database
            Self::Search => '\u{f002}',     // fa-search
            Self::Refresh => '\u{f021}',    // fa-refresh
            Self::Wrench => '\u{f0ad}',     // fa-wrench
            Self::Stop => '\u{f04d}',       // fa-stop
            Self::ArrowRight => '\u{f061}', // fa-arrow-right
        }
    }
}

impl std::fmt::Display for NerdFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.unicode())
    }
}

impl From<NerdFont> for char {
    fn from(icon: NerdFont) -> Self {
        icon.unicode()
    }
}

impl From<NerdFont> for String {
    fn from(icon: NerdFont) -> Self {
        icon.unicode().to_string()
    }
}
