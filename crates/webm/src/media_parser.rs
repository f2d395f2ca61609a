use std::sync::Arc;

use bytes_util::ByteQueue;
use media_types::{InitCb, KeySource, NewSampleCb, StreamInfo};
use tracing::{debug, error, trace, warn};

use crate::cluster::{ClusterParser, ClusterTrack};
use crate::config::WebMParserConfig;
use crate::ebml::parse_element_header;
use crate::info::SegmentInfo;
use crate::tracks::{TrackEntry, Tracks};
use crate::{Result, WebMError, ids};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    AwaitingInit,
    ParsingHeaders,
    ParsingClusters,
    Error,
}

/// How a top-level element is handled while parsing headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderElement {
    /// Carries nothing that affects stream configuration.
    Skip,
    Segment,
    Info,
    Tracks,
    Cluster,
    Unexpected,
}

impl HeaderElement {
    fn classify(id: u32) -> Self {
        match id {
            ids::EBML_HEADER
            | ids::SEEK_HEAD
            | ids::VOID
            | ids::CRC32
            | ids::CUES
            | ids::CHAPTERS
            | ids::TAGS
            | ids::ATTACHMENTS => HeaderElement::Skip,
            ids::SEGMENT => HeaderElement::Segment,
            ids::INFO => HeaderElement::Info,
            ids::TRACKS => HeaderElement::Tracks,
            ids::CLUSTER => HeaderElement::Cluster,
            _ => HeaderElement::Unexpected,
        }
    }
}

/// Incremental WebM demuxer.
///
/// Bytes may be delivered in chunks of any size. Header elements are parsed
/// once complete; the first `Info`/`Tracks` pair fires the init callback and
/// sets up the cluster parser, which then emits one sample per frame. Any
/// fatal error moves the parser to [`ParserState::Error`] for good.
pub struct WebMMediaParser {
    byte_queue: ByteQueue,
    walker: SegmentWalker,
}

/// Everything but the byte queue, so that queued bytes can be borrowed while
/// the walker advances.
struct SegmentWalker {
    config: WebMParserConfig,
    state: ParserState,
    init_cb: Option<InitCb>,
    new_sample_cb: Option<NewSampleCb>,
    decryption_key_source: Option<Arc<dyn KeySource>>,
    unknown_segment_size: bool,
    /// Info already consumed while its Tracks element is still incomplete.
    pending_info: Option<SegmentInfo>,
    cluster_parser: Option<ClusterParser>,
}

impl Default for WebMMediaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl WebMMediaParser {
    pub fn new() -> Self {
        Self::with_config(WebMParserConfig::default())
    }

    pub fn with_config(config: WebMParserConfig) -> Self {
        Self {
            byte_queue: ByteQueue::new(),
            walker: SegmentWalker {
                config,
                state: ParserState::AwaitingInit,
                init_cb: None,
                new_sample_cb: None,
                decryption_key_source: None,
                unknown_segment_size: false,
                pending_info: None,
                cluster_parser: None,
            },
        }
    }

    /// Installs the callbacks. Must be called exactly once, before
    /// [`parse`](Self::parse).
    pub fn init(
        &mut self,
        init_cb: InitCb,
        new_sample_cb: NewSampleCb,
        decryption_key_source: Option<Arc<dyn KeySource>>,
    ) -> Result<()> {
        if self.walker.state != ParserState::AwaitingInit {
            return Err(WebMError::AlreadyInitialized);
        }
        self.walker.init_cb = Some(init_cb);
        self.walker.new_sample_cb = Some(new_sample_cb);
        self.walker.decryption_key_source = decryption_key_source;
        self.walker.change_state(ParserState::ParsingHeaders);
        Ok(())
    }

    pub fn state(&self) -> ParserState {
        self.walker.state
    }

    pub fn config(&self) -> &WebMParserConfig {
        &self.walker.config
    }

    /// Whether the segment was announced with an unknown size (live stream).
    pub fn unknown_segment_size(&self) -> bool {
        self.walker.unknown_segment_size
    }

    pub fn decryption_key_source(&self) -> Option<&Arc<dyn KeySource>> {
        self.walker.decryption_key_source.as_ref()
    }

    /// Appends `buf` and consumes every complete unit now available.
    pub fn parse(&mut self, buf: &[u8]) -> Result<()> {
        match self.walker.state {
            ParserState::AwaitingInit => return Err(WebMError::NotInitialized),
            ParserState::Error => return Err(WebMError::ErrorState),
            ParserState::ParsingHeaders | ParserState::ParsingClusters => {}
        }

        self.byte_queue.push(buf);

        let data = self.byte_queue.peek();
        let mut bytes_parsed = 0;
        let result = loop {
            if bytes_parsed >= data.len() {
                break Ok(());
            }
            let old_state = self.walker.state;
            match self.walker.step(&data[bytes_parsed..]) {
                Ok(0) if self.walker.state == old_state => break Ok(()),
                Ok(n) => bytes_parsed += n,
                Err(err) => break Err(err),
            }
        };

        self.byte_queue.pop(bytes_parsed)?;

        if let Err(err) = result {
            error!(%err, "WebM parse failed");
            self.walker.change_state(ParserState::Error);
            return Err(err);
        }
        Ok(())
    }

    /// Drops buffered bytes and any partially parsed cluster. Samples held
    /// for duration estimation are emitted first. Track configuration and
    /// callbacks are kept.
    pub fn flush(&mut self) -> Result<()> {
        if self.walker.state == ParserState::AwaitingInit {
            return Err(WebMError::NotInitialized);
        }

        self.byte_queue.reset();
        self.walker.pending_info = None;
        let result = match self.walker.cluster_parser.as_mut() {
            Some(cluster_parser) => cluster_parser.flush(),
            None => Ok(()),
        };
        if self.walker.state == ParserState::ParsingClusters {
            self.walker.change_state(ParserState::ParsingHeaders);
        }
        result
    }
}

impl SegmentWalker {
    fn change_state(&mut self, new_state: ParserState) {
        debug!("ChangeState() : {:?} -> {:?}", self.state, new_state);
        self.state = new_state;
    }

    fn step(&mut self, data: &[u8]) -> Result<usize> {
        match self.state {
            ParserState::ParsingHeaders => self.parse_info_and_tracks(data),
            ParserState::ParsingClusters => self.parse_cluster(data),
            ParserState::AwaitingInit => Err(WebMError::NotInitialized),
            ParserState::Error => Err(WebMError::ErrorState),
        }
    }

    fn parse_info_and_tracks(&mut self, data: &[u8]) -> Result<usize> {
        let Some(header) = parse_element_header(data)? else {
            return Ok(0);
        };

        if self.pending_info.is_some() && header.id != ids::TRACKS {
            error!("Expected Tracks after Info, found 0x{:X}", header.id);
            return Err(WebMError::UnexpectedElement { id: header.id });
        }

        match HeaderElement::classify(header.id) {
            HeaderElement::Skip => {
                let total = header
                    .total_len()
                    .ok_or(WebMError::UnknownSize { id: header.id })?;
                if data.len() < total {
                    return Ok(0);
                }
                trace!(id = format_args!("0x{:X}", header.id), total, "skipping element");
                Ok(total)
            }
            HeaderElement::Cluster => {
                if self.cluster_parser.is_none() {
                    error!("Found Cluster element before Info.");
                    return Err(WebMError::ClusterBeforeInfo);
                }
                self.change_state(ParserState::ParsingClusters);
                Ok(0)
            }
            HeaderElement::Segment => {
                // Unknown size indicates a live stream.
                if header.is_unknown_size() {
                    self.unknown_segment_size = true;
                }
                Ok(header.header_len)
            }
            HeaderElement::Info => {
                let Some((info, info_len)) = SegmentInfo::parse(data)? else {
                    return Ok(0);
                };
                debug!(
                    timecode_scale = info.timecode_scale,
                    duration = ?info.duration,
                    "parsed segment info"
                );
                self.pending_info = Some(info);
                Ok(info_len + self.parse_tracks(&data[info_len..])?)
            }
            HeaderElement::Tracks => {
                if self.pending_info.is_none() {
                    error!("Found Tracks element before Info.");
                    return Err(WebMError::UnexpectedElement { id: header.id });
                }
                self.parse_tracks(data)
            }
            HeaderElement::Unexpected => {
                error!("Unexpected element ID 0x{:X}", header.id);
                Err(WebMError::UnexpectedElement { id: header.id })
            }
        }
    }

    fn parse_tracks(&mut self, data: &[u8]) -> Result<usize> {
        let Some((tracks, tracks_len)) = Tracks::parse(data, self.config.ignore_text_tracks)?
        else {
            return Ok(0);
        };
        let Some(info) = self.pending_info.take() else {
            return Err(WebMError::UnexpectedElement { id: ids::TRACKS });
        };
        self.on_headers(&info, tracks)?;
        Ok(tracks_len)
    }

    fn on_headers(&mut self, info: &SegmentInfo, tracks: Tracks) -> Result<()> {
        if self.cluster_parser.is_some() {
            debug!("Ignoring Info/Tracks after the streams were configured");
            return Ok(());
        }

        let duration_in_us = info.duration_in_us();
        let mut streams = Vec::new();
        let mut cluster_tracks = Vec::new();

        match &tracks.audio {
            Some(entry) => {
                let stream = StreamInfo::Audio(entry.audio_stream_info()?);
                self.add_stream(entry, stream, duration_in_us, &mut streams, &mut cluster_tracks);
            }
            None => debug!("No audio track info found."),
        }

        match &tracks.video {
            Some(entry) => {
                let stream = StreamInfo::Video(entry.video_stream_info()?);
                self.add_stream(entry, stream, duration_in_us, &mut streams, &mut cluster_tracks);
            }
            None => debug!("No video track info found."),
        }

        for entry in &tracks.text {
            let stream = StreamInfo::Text(entry.text_stream_info()?);
            self.add_stream(entry, stream, duration_in_us, &mut streams, &mut cluster_tracks);
        }

        let new_sample_cb = self
            .new_sample_cb
            .take()
            .ok_or(WebMError::NotInitialized)?;

        if let Some(init_cb) = self.init_cb.as_mut() {
            init_cb(streams);
        }

        self.cluster_parser = Some(ClusterParser::new(
            info.timecode_scale,
            cluster_tracks,
            tracks.ignored,
            new_sample_cb,
        ));
        Ok(())
    }

    fn add_stream(
        &self,
        entry: &TrackEntry,
        mut stream: StreamInfo,
        duration_in_us: Option<i64>,
        streams: &mut Vec<Arc<StreamInfo>>,
        cluster_tracks: &mut Vec<ClusterTrack>,
    ) {
        stream.set_duration(duration_in_us);
        if stream.is_encrypted() {
            self.on_encrypted_media_init_data(entry);
        }
        cluster_tracks.push(ClusterTrack {
            track_id: stream.track_id(),
            default_duration_us: entry.default_duration_us(),
        });
        streams.push(Arc::new(stream));
    }

    fn on_encrypted_media_init_data(&self, entry: &TrackEntry) {
        warn!(
            track_number = entry.number,
            has_key_source = self.decryption_key_source.is_some(),
            "WebM decryption is not implemented yet"
        );
    }

    fn parse_cluster(&mut self, data: &[u8]) -> Result<usize> {
        let Some(cluster_parser) = self.cluster_parser.as_mut() else {
            return Err(WebMError::ClusterBeforeInfo);
        };

        let bytes_parsed = cluster_parser.parse(data)?;
        if cluster_parser.cluster_ended() {
            self.change_state(ParserState::ParsingHeaders);
        }
        Ok(bytes_parsed)
    }
}
