/// Configurable options for the WebM parser
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebMParserConfig {
    /// Drop subtitle tracks instead of reporting them as text streams.
    /// Default: true
    pub ignore_text_tracks: bool,
}

impl Default for WebMParserConfig {
    fn default() -> Self {
        Self {
            ignore_text_tracks: true,
        }
    }
}

impl WebMParserConfig {
    pub fn with_ignore_text_tracks(mut self, ignore: bool) -> Self {
        self.ignore_text_tracks = ignore;
        self
    }
}
