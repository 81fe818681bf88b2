use chrono::{DateTime, Utc};
use minijinja::{context, Environment, HtmlEscape, Value};
use serde::Serialize;

use crate::{config::PageConfig, error::RenderError, latex, model::PaperRecord};

const TEMPLATE_NAME: &str = "index.html";
const TEMPLATE: &str = include_str!("../templates/index.html");

/// Renders papers into the static HTML page.
pub struct HtmlFormatter {
    env: Environment<'static>,
    page: PageConfig,
}

impl HtmlFormatter {
    pub fn new(page: PageConfig) -> Result<Self, RenderError> {
        let mut env = Environment::new();
        env.add_filter("latex", latex_filter);
        env.add_template(TEMPLATE_NAME, TEMPLATE)?;
        Ok(HtmlFormatter { env, page })
    }

    pub fn render<'a, I>(&self, records: I, generated_at: DateTime<Utc>) -> Result<String, RenderError>
    where
        I: IntoIterator<Item = &'a PaperRecord>,
    {
        let mut records = records.into_iter().collect::<Vec<_>>();
        sort_for_display(&mut records);
        let papers = records
            .into_iter()
            .map(|record| PaperView::new(record, self.page.max_authors))
            .collect::<Vec<_>>();

        let template = self.env.get_template(TEMPLATE_NAME)?;
        let html = template.render(context! {
            title => self.page.title.as_str(),
            generated_at => generated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            papers => papers,
        })?;
        Ok(html)
    }
}

/// Renders with the default page settings.
pub fn render(records: &[PaperRecord], generated_at: DateTime<Utc>) -> Result<String, RenderError> {
    HtmlFormatter::new(PageConfig::default())?.render(records, generated_at)
}

/// Newest first; papers from the same day by descending id.
pub fn sort_for_display(records: &mut [&PaperRecord]) {
    records.sort_by(|a, b| {
        b.published_date
            .cmp(&a.published_date)
            .then_with(|| b.id.cmp(&a.id))
    });
}

pub fn authors_display(authors: &[String], max_authors: usize) -> String {
    if max_authors > 0 && authors.len() > max_authors {
        format!(
            "{} and {} others",
            authors[..max_authors].join(", "),
            authors.len() - max_authors
        )
    } else {
        authors.join(", ")
    }
}

// escapes first, then turns LaTeX formatting commands into tags.
fn latex_filter(value: String) -> Value {
    let normalized = latex::normalize_text(&value);
    let escaped = HtmlEscape(&normalized).to_string();
    Value::from_safe_string(latex::markup(&escaped))
}

#[derive(Debug, Serialize)]
struct PaperView<'a> {
    id: &'a str,
    date: String,
    url: &'a str,
    title: &'a str,
    authors: String,
    abstract_text: &'a str,
}

impl<'a> PaperView<'a> {
    fn new(record: &'a PaperRecord, max_authors: usize) -> Self {
        PaperView {
            id: &record.id,
            date: record.published_date.format("%d %B %Y").to_string(),
            url: &record.url,
            title: &record.title,
            authors: authors_display(&record.authors, max_authors),
            abstract_text: &record.abstract_text,
        }
    }
}
