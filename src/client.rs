//! Boundary between the finder and whatever owns the text
use log::debug;
use serde::Serialize;
use std::borrow::Cow;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identity of a text buffer. A new id means a different document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BufferId(pub u64);

impl BufferId {
    /// A process-unique id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        BufferId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Edit counter of a buffer. Any mutation must produce a different version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
pub struct BufferVersion(pub u64);

impl BufferVersion {
    pub fn bump(self) -> Self {
        BufferVersion(self.0.wrapping_add(1))
    }
}

/// A text buffer the finder can read, select in and edit.
///
/// Ranges are UTF-8 byte offsets on char boundaries.
pub trait TextClient {
    fn buffer_id(&self) -> BufferId;

    fn version(&self) -> BufferVersion;

    fn text(&self) -> Cow<'_, str>;

    fn selection(&self) -> Range<usize>;

    fn set_selection(&mut self, range: Range<usize>);

    /// Replace `range` with `replacement` and return the range the
    /// replacement now occupies. The only way the finder mutates text.
    fn apply_edit(&mut self, range: Range<usize>, replacement: &str) -> Range<usize>;
}

/// Resolves the buffer the finder should act on.
pub trait ClientProvider {
    fn focused_buffer(&mut self) -> Option<&mut dyn TextClient>;
}

/// In-memory buffer
#[derive(Debug, Clone)]
pub struct StringBuffer {
    id: BufferId,
    version: BufferVersion,
    text: String,
    selection: Range<usize>,
}

impl StringBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            id: BufferId::next(),
            version: BufferVersion::default(),
            text: text.into(),
            selection: 0..0,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    /// Replace the whole text as an outside edit would.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
        self.selection = 0..0;
        self.version = self.version.bump();
    }

    fn clamp(&self, range: Range<usize>) -> Range<usize> {
        let floor = |mut pos: usize| {
            pos = pos.min(self.text.len());
            while !self.text.is_char_boundary(pos) {
                pos -= 1;
            }
            pos
        };
        let start = floor(range.start);
        start..floor(range.end).max(start)
    }
}

impl TextClient for StringBuffer {
    fn buffer_id(&self) -> BufferId {
        self.id
    }

    fn version(&self) -> BufferVersion {
        self.version
    }

    fn text(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.text)
    }

    fn selection(&self) -> Range<usize> {
        self.selection.clone()
    }

    fn set_selection(&mut self, range: Range<usize>) {
        self.selection = self.clamp(range);
    }

    fn apply_edit(&mut self, range: Range<usize>, replacement: &str) -> Range<usize> {
        let range = self.clamp(range);
        debug!(
            "Buffer {:?}: replacing {}..{} with {} byte(s)",
            self.id,
            range.start,
            range.end,
            replacement.len()
        );
        self.text.replace_range(range.clone(), replacement);
        self.version = self.version.bump();
        range.start..range.start + replacement.len()
    }
}

/// A provider that always focuses the same buffer, or none.
impl ClientProvider for Option<StringBuffer> {
    fn focused_buffer(&mut self) -> Option<&mut dyn TextClient> {
        self.as_mut().map(|b| b as &mut dyn TextClient)
    }
}

impl ClientProvider for StringBuffer {
    fn focused_buffer(&mut self) -> Option<&mut dyn TextClient> {
        Some(self)
    }
}
