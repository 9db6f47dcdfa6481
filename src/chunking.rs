//! Fixed-size window chunker with blank-line-aware boundaries.
//!
//! Three-tier splitting strategy:
//! 1. Split at blank lines (natural paragraph boundaries)
//! 2. Merge small segments up to the character budget
//! 3. If a segment is still too large, split at single newlines
//!
//! Each chunk's embed text is prefixed with a compact file-level header
//! (path, language, first lines of the file) so that even a small chunk of
//! a deeply nested helper carries enough context for the embedding model to
//! place it correctly. The raw code is kept separately for display and
//! prompting.

use crate::config::ChunkingConfig;
use crate::git::SourceFile;
use crate::models::Chunk;

/// Split one source file into chunks with position metadata.
pub fn chunk_file(file: &SourceFile, cfg: &ChunkingConfig) -> Vec<Chunk> {
    let windows = split_windows(&file.content, cfg.chunk_size);
    let total = windows.len();

    let file_header: String = file
        .content
        .chars()
        .take(cfg.header_preview_chars)
        .collect::<String>()
        .trim()
        .to_string();

    windows
        .into_iter()
        .enumerate()
        .map(|(i, text)| {
            let embed_text = build_embed_text(file, &text, &file_header);
            Chunk {
                id: Chunk::derive_id(&file.relative_path, i),
                text,
                embed_text,
                source_path: file.relative_path.clone(),
                language: file.language.clone(),
                chunk_index: i,
                total_chunks: total,
            }
        })
        .collect()
}

/// Wrap a chunk's raw code with file-level context for richer embeddings.
///
/// Format:
///     [File: path/to/file.rs] [Language: rust]
///     [File Header]
///     <first N chars of the file>
///     ---
///     <chunk code>
fn build_embed_text(file: &SourceFile, raw: &str, file_header: &str) -> String {
    let tags = format!(
        "[File: {}] [Language: {}]",
        file.relative_path, file.language
    );

    // Skip the header preview when it would just duplicate the chunk itself
    // (single-chunk files).
    let mut header_section = String::new();
    if !file_header.is_empty() {
        let header_head: String = file_header.trim().chars().take(100).collect();
        let raw_head: String = raw.trim().chars().take(100).collect();
        if header_head != raw_head {
            header_section = format!("\n[File Header]\n{file_header}\n");
        }
    }

    format!("{tags}{header_section}\n---\n{raw}")
}

/// Split content into windows of at most `budget` non-whitespace characters.
fn split_windows(content: &str, budget: usize) -> Vec<String> {
    if content.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = content.lines().collect();
    let segments = split_at_blank_lines(&lines);

    let mut windows = Vec::new();
    let mut current_start = 0usize;
    let mut current_end = 0usize;
    let mut current_chars = 0usize;
    let mut started = false;

    let flush = |start: usize, end: usize, windows: &mut Vec<String>| {
        windows.push(lines[start..=end].join("\n"));
    };

    for seg in &segments {
        let seg_chars = segment_chars(&lines, seg.start, seg.end);

        if seg_chars > budget {
            if started {
                flush(current_start, current_end, &mut windows);
                started = false;
                current_chars = 0;
            }
            split_large_segment(&lines, seg.start, seg.end, budget, &mut windows);
        } else if started && current_chars + seg_chars > budget {
            flush(current_start, current_end, &mut windows);
            current_start = seg.start;
            current_end = seg.end;
            current_chars = seg_chars;
        } else {
            if !started {
                current_start = seg.start;
                started = true;
            }
            current_end = seg.end;
            current_chars += seg_chars;
        }
    }

    if started {
        flush(current_start, current_end, &mut windows);
    }

    windows
}

struct Segment {
    start: usize,
    end: usize,
}

fn split_at_blank_lines(lines: &[&str]) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut seg_start: Option<usize> = None;

    for (i, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            if let Some(start) = seg_start.take() {
                segments.push(Segment {
                    start,
                    end: i.saturating_sub(1),
                });
            }
        } else if seg_start.is_none() {
            seg_start = Some(i);
        }
    }

    if let Some(start) = seg_start {
        segments.push(Segment {
            start,
            end: lines.len() - 1,
        });
    }

    segments
}

fn segment_chars(lines: &[&str], start: usize, end: usize) -> usize {
    lines[start..=end]
        .iter()
        .flat_map(|l| l.chars())
        .filter(|c| !c.is_whitespace())
        .count()
}

fn split_large_segment(
    lines: &[&str],
    start: usize,
    end: usize,
    budget: usize,
    windows: &mut Vec<String>,
) {
    let mut chunk_start = start;
    let mut chars = 0usize;

    for i in start..=end {
        let line_chars: usize = lines[i].chars().filter(|c| !c.is_whitespace()).count();
        if chars + line_chars > budget && i > chunk_start {
            windows.push(lines[chunk_start..i].join("\n"));
            chunk_start = i;
            chars = line_chars;
        } else {
            chars += line_chars;
        }
    }

    if chunk_start <= end {
        windows.push(lines[chunk_start..=end].join("\n"));
    }
}
