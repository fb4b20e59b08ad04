//! Minimal MARC21-in-XML tree reader shared by the SRU adapter.
//!
//! Normalizes the single/repeated-element ambiguity spec §9 calls out by
//! always collecting `record`/`datafield`/`subfield` into `Vec`s, regardless
//! of how many siblings the upstream actually sent — the boundary-
//! normalization strategy spec §9 recommends for any language.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::error::AdapterError;

#[derive(Debug, Clone, Default)]
pub struct MarcField {
    pub tag: String,
    pub subfields: Vec<(char, String)>,
}

impl MarcField {
    pub fn subfield(&self, code: char) -> Option<&str> {
        self.subfields
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MarcRecord {
    pub fields: Vec<MarcField>,
}

impl MarcRecord {
    pub fn fields_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a MarcField> {
        self.fields.iter().filter(move |f| f.tag == tag)
    }

    pub fn first_field<'a>(&'a self, tag: &'a str) -> Option<&'a MarcField> {
        self.fields_with_tag(tag).next()
    }
}

fn local_name(qname: &[u8]) -> &[u8] {
    match qname.iter().position(|&b| b == b':') {
        Some(idx) => &qname[idx + 1..],
        None => qname,
    }
}

fn attr_value(e: &quick_xml::events::BytesStart, name: &[u8]) -> Option<String> {
    e.attributes().flatten().find_map(|a| {
        if local_name(a.key.as_ref()) == name {
            a.unescape_value().ok().map(|v| v.into_owned())
        } else {
            None
        }
    })
}

/// Parse every `record` element in an SRU `searchRetrieveResponse` body,
/// ignoring any namespace prefixes (Koha, Evergreen, and bare-MARCXML
/// endpoints all disagree on prefixing `record`/`datafield`/`subfield`).
pub fn parse_records(xml: &str) -> Result<Vec<MarcRecord>, AdapterError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut current_record: Option<MarcRecord> = None;
    let mut current_field: Option<MarcField> = None;
    let mut current_subfield_code: Option<char> = None;
    let mut text_buf = String::new();

    loop {
        match reader.read_event().map_err(|e| AdapterError::Parse(format!("XML error: {e}")))? {
            Event::Start(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                match name.as_slice() {
                    b"record" => current_record = Some(MarcRecord::default()),
                    b"datafield" => {
                        let tag = attr_value(&e, b"tag").unwrap_or_default();
                        current_field = Some(MarcField { tag, subfields: Vec::new() });
                    }
                    b"subfield" => {
                        let code = attr_value(&e, b"code").and_then(|s| s.chars().next()).unwrap_or('?');
                        current_subfield_code = Some(code);
                        text_buf.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(t) => {
                if current_subfield_code.is_some() {
                    text_buf.push_str(&t.unescape().unwrap_or_default());
                }
            }
            Event::End(e) => {
                let name = local_name(e.name().as_ref()).to_vec();
                match name.as_slice() {
                    b"subfield" => {
                        if let (Some(code), Some(field)) = (current_subfield_code.take(), current_field.as_mut()) {
                            field.subfields.push((code, std::mem::take(&mut text_buf)));
                        }
                    }
                    b"datafield" => {
                        if let (Some(field), Some(record)) = (current_field.take(), current_record.as_mut()) {
                            record.fields.push(field);
                        }
                    }
                    b"record" => {
                        if let Some(record) = current_record.take() {
                            records.push(record);
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
<searchRetrieveResponse>
  <records>
    <record>
      <datafield tag="090">
        <subfield code="a">F GAT</subfield>
      </datafield>
      <datafield tag="952">
        <subfield code="a">main</subfield>
        <subfield code="c">fiction</subfield>
        <subfield code="o">F GAT</subfield>
        <subfield code="7">0</subfield>
      </datafield>
      <datafield tag="952">
        <subfield code="a">branch2</subfield>
        <subfield code="o">F GAT c.2</subfield>
        <subfield code="7">1</subfield>
        <subfield code="q">2026-08-01</subfield>
      </datafield>
    </record>
  </records>
</searchRetrieveResponse>
"#;

    #[test]
    fn parses_repeated_datafields_into_vec() {
        let records = parse_records(SAMPLE).unwrap();
        assert_eq!(records.len(), 1);
        let items: Vec<_> = records[0].fields_with_tag("952").collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].subfield('a'), Some("main"));
        assert_eq!(items[1].subfield('q'), Some("2026-08-01"));
    }

    #[test]
    fn single_record_with_no_items_still_yields_bib_field() {
        let xml = r#"<records><record><datafield tag="090"><subfield code="a">F GAT</subfield></datafield></record></records>"#;
        let records = parse_records(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].first_field("952").is_none());
        assert_eq!(records[0].first_field("090").unwrap().subfield('a'), Some("F GAT"));
    }

    #[test]
    fn malformed_xml_is_parse_error() {
        let xml = r#"<record><datafield tag="952"><subfield code="a">text</datafield></record>"#;
        let err = parse_records(xml).unwrap_err();
        assert!(matches!(err, AdapterError::Parse(_)));
    }
}
