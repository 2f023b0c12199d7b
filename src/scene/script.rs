//! Generated-script assembly for the remote 3D application.
//!
//! The control channel's only contract is "submit a script body, it executes
//! against the current scene state", and it enforces a command-length limit.
//! Scripts are therefore built from self-contained blocks: each block is a
//! complete top-level section that can run on its own (after the shared
//! prelude), and chunking packs whole blocks up to the byte limit without
//! ever splitting inside one.

use std::fmt::Write as _;

use log::warn;

/// Default per-command byte limit for the control channel.
pub const MAX_COMMAND_BYTES: usize = 60_000;

#[derive(Debug, Clone)]
pub struct SceneScript {
    prelude: String,
    blocks: Vec<String>,
}

impl SceneScript {
    pub fn new(prelude: impl Into<String>) -> Self {
        Self {
            prelude: prelude.into(),
            blocks: Vec::new(),
        }
    }

    pub fn push(&mut self, block: impl Into<String>) {
        let block = block.into();
        if !block.trim().is_empty() {
            self.blocks.push(block);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// The whole script as one body, for `--emit` / manual execution.
    pub fn source(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{}", self.prelude.trim_end());
        for block in &self.blocks {
            let _ = writeln!(out, "\n{}", block.trim_end());
        }
        out
    }

    /// Split into submission chunks of at most `max_bytes` each. Every chunk
    /// repeats the prelude so it executes in a fresh namespace. A single
    /// oversized block is sent alone; the channel's own error is the
    /// backstop there.
    pub fn chunks(&self, max_bytes: usize) -> Vec<String> {
        let prelude = format!("{}\n", self.prelude.trim_end());
        let mut chunks = Vec::new();
        let mut current = String::new();

        for block in &self.blocks {
            let block = block.trim_end();
            let candidate_len = if current.is_empty() {
                prelude.len() + 1 + block.len()
            } else {
                current.len() + 1 + block.len()
            };

            if !current.is_empty() && candidate_len > max_bytes {
                chunks.push(current);
                current = String::new();
            }

            if current.is_empty() {
                current = format!("{prelude}\n{block}");
                if current.len() > max_bytes {
                    warn!(
                        "script block exceeds the {max_bytes}-byte command limit ({} bytes); submitting as-is",
                        current.len()
                    );
                    chunks.push(current);
                    current = String::new();
                }
            } else {
                let _ = write!(current, "\n{block}");
            }
        }

        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

/// Quote a string as a Python single-quoted literal.
pub fn py_str(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}

/// Format a float as a Python literal (always with a decimal point).
pub fn py_f32(value: f32) -> String {
    format!("{value:?}")
}

/// Format a 3-tuple of floats as a Python literal.
pub fn py_vec3(value: [f32; 3]) -> String {
    format!(
        "({}, {}, {})",
        py_f32(value[0]),
        py_f32(value[1]),
        py_f32(value[2])
    )
}
