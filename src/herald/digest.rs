use serde::Serialize;
use tera::{Context, Tera};

use crate::error::Result;
use crate::models::Story;

const DIGEST_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: sans-serif; max-width: 640px; margin: 0 auto;">
  <h1>{{ alert_name }}</h1>
  <p style="color: #666;">{{ cadence }} &middot; {{ readers }} reader{% if readers != 1 %}s{% endif %}</p>
  {% for story in stories %}
  <div style="margin: 24px 0;">
    <h2 style="font-size: 18px;"><a href="{{ story.permalink | safe }}">{{ story.title }}</a></h2>
    {% if story.key_findings %}
    <ul>
      {% for finding in story.key_findings %}<li>{{ finding }}</li>
      {% endfor %}
    </ul>
    {% endif %}
  </div>
  {% endfor %}
</body>
</html>
"#;

#[derive(Serialize)]
struct DigestView<'a> {
    alert_name: &'a str,
    cadence: &'a str,
    readers: usize,
    stories: Vec<StoryView<'a>>,
}

#[derive(Serialize)]
struct StoryView<'a> {
    title: &'a str,
    key_findings: &'a [String],
    permalink: String,
}

/// Email digest renderer. Autoescaping is on for the `.html` template, so
/// titles and findings from synthesis are inserted safely.
pub struct Digest {
    tera: Tera,
}

impl Digest {
    pub fn new() -> Result<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("digest.html", DIGEST_TEMPLATE)?;
        Ok(Self { tera })
    }

    pub fn render(
        &self,
        alert_name: &str,
        cadence: &str,
        readers: usize,
        stories: &[Story],
        base_url: &str,
    ) -> Result<String> {
        let view = DigestView {
            alert_name,
            cadence,
            readers,
            stories: stories
                .iter()
                .map(|story| StoryView {
                    title: &story.title,
                    key_findings: &story.key_findings,
                    permalink: permalink(base_url, story),
                })
                .collect(),
        };
        let context = Context::from_serialize(&view)?;
        Ok(self.tera.render("digest.html", &context)?)
    }
}

pub fn permalink(base_url: &str, story: &Story) -> String {
    format!("{}/stories/{}", base_url.trim_end_matches('/'), story.id)
}
