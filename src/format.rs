use serde::Serialize;

use crate::model::OutputRow;

pub const CSV_HEADER: [&str; 4] = ["title", "abstract_link", "pdf_link", "published"];

#[derive(Serialize)]
struct IndexedRow<'a> {
    index: usize,
    #[serde(flatten)]
    row: &'a OutputRow,
}

pub struct Formatter;

impl Formatter {
    pub fn to_readme(data: &OutputRow) -> String {
        let mut links = Vec::new();
        if let Some(link) = &data.abstract_link {
            links.push(format!("[abs]({})", link));
        }
        if let Some(link) = &data.pdf_link {
            links.push(format!("[pdf]({})", link));
        }
        format!(
            "### {}\n_Published: {}_<br/>\n{}\n\n",
            data.title,
            data.published.format("%Y.%m.%d"),
            links.join(" | ")
        )
    }

    pub fn to_readme_empty() -> String {
        "_No qualifying papers this week._\n".to_string()
    }

    pub fn to_jsonl_with_id(index: usize, data: &OutputRow) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(&IndexedRow { index, row: data })?;
        line.push('\n');
        Ok(line)
    }
}
