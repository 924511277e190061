//! Default document written on first run.

use html_escape::{encode_double_quoted_attribute, encode_text};

use crate::config::EntityConfig;

const STYLE: &str = r"
        body {
            font-family: 'Arial', sans-serif;
            line-height: 1.6;
            margin: 0;
            padding: 0;
            color: #333;
            background-color: #f8f8f8;
        }
        .container {
            max-width: 1200px;
            margin: 0 auto;
            padding: 2rem;
        }
        header {
            text-align: center;
            padding: 2rem 0;
        }
        .content {
            background-color: white;
            padding: 2rem;
            border-radius: 5px;
            box-shadow: 0 2px 5px rgba(0,0,0,0.1);
        }
        footer {
            text-align: center;
            padding: 1rem 0;
            margin-top: 2rem;
            font-size: 0.9rem;
            color: #777;
        }
        .modifications {
            margin-top: 2rem;
            padding-top: 1rem;
            border-top: 1px solid #eee;
        }
        .timestamp {
            font-size: 0.8rem;
            color: #999;
        }
";

/// The starter page for `entity`: a header, one content block holding the
/// modifications log, and a footer with a last-updated stamp.
pub fn default_document(entity: &EntityConfig) -> String {
    let name = encode_text(&entity.name);
    let description = encode_double_quoted_attribute(&entity.mission);
    let mission = encode_text(&entity.mission);
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <meta name="description" content="{description}">
    <title>{name}</title>
    <style>{STYLE}    </style>
</head>
<body>
    <div class="container">
        <header class="masthead">
            <h1>{name}</h1>
            <p>e<sup>iπ</sup> + 1 = 0</p>
        </header>

        <div class="content">
            <p>{mission}</p>

            <div class="modifications">
                <h2>Evolving Thoughts</h2>
                <!-- Modifications will be inserted here -->
            </div>
        </div>

        <footer class="site-footer">
            <p>&copy; {name}. All rights reserved.</p>
            <p>Last updated: <span id="last-update">Never</span></p>
        </footer>
    </div>
</body>
</html>
"#
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dom::Document;
    use crate::sections::{SectionIndexer, SectionKind};

    #[test]
    fn test_default_document_is_indexable() -> crate::Result<()> {
        let config = Config::default();
        let doc = Document::parse(&default_document(&config.entity))?;
        let index = SectionIndexer::from_config(&config)?.index(&doc);

        assert!(doc.html_root().is_some() && doc.body().is_some());
        assert!(index.iter().any(|s| s.kind == SectionKind::Title));
        assert!(index.iter().any(|s| s.kind == SectionKind::ModificationsLog));
        assert_eq!(index.get("footer_site-footer").map(|s| s.kind), Some(SectionKind::Footer));
        assert_eq!(index.get("header_masthead").map(|s| s.kind), Some(SectionKind::Header));
        assert_eq!(
            doc.find_by_id("last-update").map(|n| doc.text_content(n)),
            Some("Never".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_entity_text_is_escaped() -> crate::Result<()> {
        let entity = EntityConfig {
            name: "Fish & <Chips>".into(),
            mission: "Say \"hi\"".into(),
            ..EntityConfig::default()
        };
        let html = default_document(&entity);
        assert!(html.contains("<title>Fish &amp; &lt;Chips&gt;</title>"));

        let doc = Document::parse(&html)?;
        let title = doc.first_element_named("title").unwrap();
        assert_eq!(doc.text_content(title), "Fish & <Chips>");
        let meta = doc.select_first("meta[name=description]")?.unwrap();
        assert_eq!(doc.attr(meta, "content"), Some("Say \"hi\""));
        Ok(())
    }
}
