//! Reassembly of XML documents returned in pieces, one piece per row.

use std::ops::ControlFlow;

use tracing::debug;

use crate::sqlite::{Row, Value};

/// Marks the end of meaningful output; anything after it in the same chunk is
/// driver padding and gets dropped.
pub const SCRIPT_END_TAG: &str = "</script>";

/// Accumulates chunks until one of them carries [`SCRIPT_END_TAG`].
#[derive(Debug, Default)]
pub struct XmlAssembler {
    output: String,
    chunks: usize,
    terminated: bool,
}

impl XmlAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one chunk. Returns `Break` once the end tag has been seen; any
    /// chunk pushed after that is ignored.
    pub fn push_chunk(&mut self, chunk: &str) -> ControlFlow<()> {
        if self.terminated {
            return ControlFlow::Break(());
        }
        if chunk.is_empty() {
            return ControlFlow::Continue(());
        }
        self.chunks += 1;
        match chunk.find(SCRIPT_END_TAG) {
            Some(pos) => {
                self.output.push_str(&chunk[..pos + SCRIPT_END_TAG.len()]);
                self.terminated = true;
                ControlFlow::Break(())
            }
            None => {
                self.output.push_str(chunk);
                ControlFlow::Continue(())
            }
        }
    }

    /// Append the first value of `row`, whatever its column is called.
    pub fn push_row(&mut self, row: &Row) -> ControlFlow<()> {
        match row.first() {
            None | Some(Value::Null) => ControlFlow::Continue(()),
            Some(Value::Text(text)) => self.push_chunk(text),
            Some(Value::Blob(bytes)) => self.push_chunk(&String::from_utf8_lossy(bytes)),
            Some(Value::Integer(i)) => self.push_chunk(&i.to_string()),
            Some(Value::Real(f)) => self.push_chunk(&f.to_string()),
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn finish(self) -> String {
        debug!(
            chunks = self.chunks,
            terminated = self.terminated,
            len = self.output.len(),
            "assembled xml output"
        );
        self.output
    }
}

/// Concatenate the first value of each row, stopping after the chunk that
/// contains `</script>`. Rows after that one are not pulled from the iterator.
pub fn assemble_xml<'a, I>(rows: I) -> String
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut assembler = XmlAssembler::new();
    for row in rows {
        if assembler.push_row(row).is_break() {
            break;
        }
    }
    assembler.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(chunks: &[&str]) -> Vec<Row> {
        chunks
            .iter()
            .map(|c| Row::new(vec!["XML".to_string()], vec![Value::Text(c.to_string())]))
            .collect()
    }

    #[test]
    fn truncates_after_end_tag_and_skips_later_rows() {
        let rows = rows(&["<a>", "<b></script>garbage", "<c>"]);
        assert_eq!(assemble_xml(&rows), "<a><b></script>");
    }

    #[test]
    fn concatenates_everything_without_end_tag() {
        let rows = rows(&["<a>", "<b>"]);
        assert_eq!(assemble_xml(&rows), "<a><b>");
    }

    #[test]
    fn empty_and_null_chunks_are_skipped() {
        let mut input = rows(&["<a>", "", "<b>"]);
        input.insert(1, Row::new(vec!["XML".to_string()], vec![Value::Null]));
        input.push(Row::new(vec![], vec![]));
        input.extend(rows(&["</script>tail"]));
        assert_eq!(assemble_xml(&input), "<a><b></script>");
    }

    #[test]
    fn end_tag_split_across_rows_is_not_a_terminator() {
        let rows = rows(&["<a></scr", "ipt>", "<b>"]);
        assert_eq!(assemble_xml(&rows), "<a></script><b>");
    }

    #[test]
    fn first_occurrence_wins() {
        let rows = rows(&["<x></script></script>"]);
        assert_eq!(assemble_xml(&rows), "<x></script>");
    }

    #[test]
    fn pushing_after_termination_is_ignored() {
        let mut assembler = XmlAssembler::new();
        assert!(assembler.push_chunk("<a></script>").is_break());
        assert!(assembler.is_terminated());
        assert!(assembler.push_chunk("<b>").is_break());
        assert_eq!(assembler.finish(), "<a></script>");
    }

    #[test]
    fn blob_chunks_are_decoded_as_text() {
        let row = Row::new(
            vec!["OUT".to_string()],
            vec![Value::Blob(b"<r></script>\0\0".to_vec())],
        );
        assert_eq!(assemble_xml([&row]), "<r></script>");
    }

    #[test]
    fn numeric_zero_is_kept() {
        let row = Row::new(vec!["N".to_string()], vec![Value::Integer(0)]);
        assert_eq!(assemble_xml([&row]), "0");
    }
}
