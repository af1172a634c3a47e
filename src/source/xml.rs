use std::path::Path;

use quick_xml::events::{BytesStart, BytesText, Event};
use tracing::{debug, info};

use super::{ImageRef, LocalizedContent, SourceManual, SourceNode};
use crate::error::SourceError;

/// Read and parse a `content.xml` file.
pub fn read_manual(path: &Path) -> Result<SourceManual, SourceError> {
    info!("Parsing VLP XML: {}", path.display());
    let xml = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let manual = parse_manual(&xml)?;
    info!(
        "Parsed manual: {} ({} top-level sections)",
        manual.name,
        manual.nodes.len()
    );
    Ok(manual)
}

/// Build the source tree from a VLP `Manual` document.
pub fn parse_manual(xml: &str) -> Result<SourceManual, SourceError> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut manual: Option<SourceManual> = None;
    // Element names from the root down to the current element.
    let mut path: Vec<Vec<u8>> = Vec::new();
    // ContentNodes that are open but not yet closed.
    let mut open: Vec<SourceNode> = Vec::new();
    let mut text = String::new();
    // Set while inside a second LocaleContent of the same node.
    let mut skip_locale = false;

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let parent = path.last().map(Vec::as_slice);
                match e.name().as_ref() {
                    b"Manual" if manual.is_none() => {
                        manual = Some(SourceManual {
                            id: attr(&e, b"id")?,
                            ..Default::default()
                        });
                    }
                    b"ContentNode" => open.push(SourceNode {
                        id: attr(&e, b"id")?,
                        ..Default::default()
                    }),
                    b"LocaleContent" => {
                        if let Some(node) = open.last_mut() {
                            if node.localized.is_some() {
                                debug!("Ignoring extra LocaleContent on node {}", node.id);
                                skip_locale = true;
                            } else {
                                node.localized = Some(LocalizedContent::default());
                            }
                        }
                    }
                    b"img" if matches!(parent, Some(b"images")) && !skip_locale => {
                        push_image(&mut open, &e)?;
                    }
                    _ => {}
                }
                path.push(e.name().as_ref().to_vec());
                text.clear();
            }
            Event::Empty(e) => {
                let parent = path.last().map(Vec::as_slice);
                match e.name().as_ref() {
                    b"img" if matches!(parent, Some(b"images")) && !skip_locale => {
                        push_image(&mut open, &e)?;
                    }
                    b"ContentNode" => {
                        let node = SourceNode {
                            id: attr(&e, b"id")?,
                            ..Default::default()
                        };
                        attach(node, &mut open, manual.as_mut());
                    }
                    _ => {}
                }
            }
            Event::Text(e) => text.push_str(&decode_text(&e)),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
            Event::End(e) => {
                path.pop();
                let parent = path.last().map(Vec::as_slice);
                let value = std::mem::take(&mut text);
                match (e.name().as_ref(), parent) {
                    (b"ContentNode", _) => {
                        if let Some(node) = open.pop() {
                            attach(node, &mut open, manual.as_mut());
                        }
                    }
                    (b"LocaleContent", _) => skip_locale = false,
                    (b"name", Some(b"Manual")) => {
                        if let Some(m) = manual.as_mut() {
                            m.name = value.trim().to_string();
                        }
                    }
                    (b"defaultLanguageCode", Some(b"Manual")) => {
                        if let Some(m) = manual.as_mut() {
                            m.language = value.trim().to_string();
                        }
                    }
                    (b"dataFormat", Some(b"Manual")) => {
                        if let Some(m) = manual.as_mut() {
                            m.data_format = value.trim().to_string();
                        }
                    }
                    (b"title", Some(b"ContentNode")) => {
                        if let Some(node) = open.last_mut() {
                            node.title = value.trim().to_string();
                        }
                    }
                    (b"orderIndex", Some(b"ContentNode")) => {
                        if let Some(node) = open.last_mut() {
                            node.order = value.trim().parse().unwrap_or(0);
                        }
                    }
                    (field, Some(b"LocaleContent")) if !skip_locale => {
                        if let Some(loc) = open.last_mut().and_then(|n| n.localized.as_mut()) {
                            match field {
                                b"title" => loc.title = value.trim().to_string(),
                                b"languageCode" => loc.language = value.trim().to_string(),
                                b"content" => loc.body = value,
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let mut manual = manual.ok_or(SourceError::MissingRoot)?;
    if manual.language.is_empty() {
        manual.language = "en".to_string();
    }
    Ok(manual)
}

fn attach(node: SourceNode, open: &mut [SourceNode], manual: Option<&mut SourceManual>) {
    if let Some(parent) = open.last_mut() {
        parent.children.push(node);
    } else if let Some(m) = manual {
        m.nodes.push(node);
    }
}

fn push_image(open: &mut [SourceNode], e: &BytesStart) -> Result<(), SourceError> {
    let image = ImageRef {
        src: attr(e, b"src")?,
        filename: attr(e, b"filename")?,
        width: attr(e, b"width")?,
        height: attr(e, b"height")?,
    };
    if let Some(loc) = open.last_mut().and_then(|n| n.localized.as_mut()) {
        loc.images.push(image);
    }
    Ok(())
}

fn attr(e: &BytesStart, key: &[u8]) -> Result<String, SourceError> {
    for a in e.attributes() {
        let a = a.map_err(quick_xml::Error::from)?;
        if a.key.as_ref() == key {
            return Ok(a.unescape_value()?.into_owned());
        }
    }
    Ok(String::new())
}

/// XML-unescape text; exports sometimes carry HTML-only entities such as
/// `&nbsp;` that XML rejects, so fall back to HTML decoding for those.
fn decode_text(e: &BytesText) -> String {
    match e.unescape() {
        Ok(s) => s.into_owned(),
        Err(_) => html_escape::decode_html_entities(&String::from_utf8_lossy(e)).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<Manual id="m-1">
  <name>HOL-2601</name>
  <defaultLanguageCode>en</defaultLanguageCode>
  <dataFormat>default</dataFormat>
  <contentNodes>
    <ContentNode id="title-node">
      <title>Lab Title</title>
      <orderIndex>0</orderIndex>
    </ContentNode>
    <ContentNode id="ch-1">
      <title>Module 1</title>
      <orderIndex>1</orderIndex>
      <localizations>
        <LocaleContent id="lc-1">
          <title>Module 1 (en)</title>
          <languageCode>en</languageCode>
          <content>&lt;p&gt;Intro &amp;amp;gt; here&lt;/p&gt;</content>
        </LocaleContent>
      </localizations>
      <children>
        <ContentNode id="art-1">
          <title>Article</title>
          <orderIndex>7</orderIndex>
          <localizations>
            <LocaleContent id="lc-2">
              <content><![CDATA[<p>raw <b>cdata</b></p>]]></content>
              <images>
                <img src="./images/a.png" filename="a.png" width="640" height="480"/>
              </images>
            </LocaleContent>
            <LocaleContent id="lc-3">
              <content>second locale</content>
            </LocaleContent>
          </localizations>
        </ContentNode>
      </children>
    </ContentNode>
  </contentNodes>
</Manual>"#;

    #[test]
    fn parses_manual_fields() {
        let m = parse_manual(SAMPLE).unwrap();
        assert_eq!(m.id, "m-1");
        assert_eq!(m.name, "HOL-2601");
        assert_eq!(m.language, "en");
        assert_eq!(m.data_format, "default");
        assert_eq!(m.nodes.len(), 2);
    }

    #[test]
    fn builds_nested_tree() {
        let m = parse_manual(SAMPLE).unwrap();
        let title = &m.nodes[0];
        assert_eq!(title.id, "title-node");
        assert!(!title.has_children());
        assert!(title.localized.is_none());

        let chapter = &m.nodes[1];
        assert_eq!(chapter.title, "Module 1");
        assert_eq!(chapter.order, 1);
        // XML unescape happens here; the HTML-level double encoding stays
        assert_eq!(chapter.body(), "<p>Intro &amp;gt; here</p>");
        let loc = chapter.localized.as_ref().unwrap();
        assert_eq!(loc.title, "Module 1 (en)");
        assert_eq!(loc.language, "en");

        let article = &chapter.children[0];
        assert_eq!(article.order, 7);
        assert_eq!(article.body(), "<p>raw <b>cdata</b></p>");
        assert_eq!(
            article.images(),
            &[ImageRef {
                src: "./images/a.png".into(),
                filename: "a.png".into(),
                width: "640".into(),
                height: "480".into(),
            }]
        );
    }

    #[test]
    fn html_only_entities_fall_back() {
        let xml = r#"<Manual id="x"><name>A&nbsp;B</name></Manual>"#;
        let m = parse_manual(xml).unwrap();
        assert_eq!(m.name, "A\u{a0}B");
        assert_eq!(m.language, "en");
    }

    #[test]
    fn missing_root_is_an_error() {
        let err = parse_manual("<Other/>").unwrap_err();
        assert!(matches!(err, SourceError::MissingRoot));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        let err = parse_manual("<Manual id=\"x\"><name>oops</Manual>").unwrap_err();
        assert!(matches!(err, SourceError::Xml(_)));
    }

    #[test]
    fn fixture_export_parses() {
        let m = read_manual(Path::new("tests/fixtures/lab/content.xml")).unwrap();
        assert_eq!(m.name, "HOL-2601-03 Fixture Lab");
        assert_eq!(m.nodes.len(), 3);
    }
}
