use crate::error::{FinderError, Result};
use arboard::Clipboard;

pub struct ClipboardManager {
    clipboard: Clipboard,
}

impl ClipboardManager {
    pub fn new() -> Result<Self> {
        Ok(Self {
            clipboard: Clipboard::new()?,
        })
    }

    pub fn copy_to_clipboard(&mut self, content: &str) -> Result<()> {
        self.clipboard.set_text(content)?;

        // Read back; some platforms drop the contents silently.
        let copied = self.clipboard.get_text()?;
        if copied != content {
            return Err(FinderError::Other(
                "Clipboard verification failed: content mismatch".to_string(),
            ));
        }

        Ok(())
    }
}
