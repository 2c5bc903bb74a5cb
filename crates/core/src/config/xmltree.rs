//! A minimal in-memory XML element tree used as the intermediate form
//! between `quick_xml`'s event stream and this crate's config schema
//! (§4.2, §6). The schema is shallow enough (flat attributes, short lists
//! of child elements) that a small generic tree is simpler to map to/from
//! than per-type serde derives with custom renames.

use crate::error::ReplError;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::io::Cursor;

#[derive(Debug, Clone, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.push((key.into(), value.into()));
        self
    }

    pub fn text(mut self, value: impl Into<String>) -> Self {
        self.text = value.into();
        self
    }

    pub fn child(mut self, el: Element) -> Self {
        self.children.push(el);
        self
    }

    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn child_named(&self, name: &str) -> Option<&Element> {
        self.children_named(name).next()
    }

    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child_named(name).map(|c| c.text.as_str())
    }
}

pub fn parse(xml: &str) -> Result<Element, ReplError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => stack.push(element_from_start(&e)?),
            Event::Empty(e) => {
                let el = element_from_start(&e)?;
                close_into_parent(&mut stack, &mut root, el);
            }
            Event::Text(t) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&t.unescape()?);
                }
            }
            Event::End(_) => {
                let el = stack.pop().ok_or_else(|| {
                    ReplError::Config("unbalanced XML: unexpected close tag".into())
                })?;
                close_into_parent(&mut stack, &mut root, el);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    root.ok_or_else(|| ReplError::Config("empty XML document".into()))
}

fn close_into_parent(stack: &mut Vec<Element>, root: &mut Option<Element>, el: Element) {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(el);
    } else {
        *root = Some(el);
    }
}

fn element_from_start(e: &BytesStart) -> Result<Element, ReplError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut el = Element::new(name);
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ReplError::Config(err.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        el.attrs.push((key, value));
    }
    Ok(el)
}

pub fn render(root: &Element) -> Result<String, ReplError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);
    write_element(&mut writer, root)?;
    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8(bytes).expect("quick_xml writer always emits valid UTF-8"))
}

fn write_element(
    writer: &mut Writer<Cursor<Vec<u8>>>,
    el: &Element,
) -> Result<(), ReplError> {
    if el.children.is_empty() && el.text.is_empty() {
        let mut start = BytesStart::new(el.name.clone());
        for (k, v) in &el.attrs {
            start.push_attribute((k.as_str(), v.as_str()));
        }
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }

    let mut start = BytesStart::new(el.name.clone());
    for (k, v) in &el.attrs {
        start.push_attribute((k.as_str(), v.as_str()));
    }
    writer.write_event(Event::Start(start))?;

    if !el.text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(&el.text)))?;
    }
    for child in &el.children {
        write_element(writer, child)?;
    }

    writer.write_event(Event::End(BytesEnd::new(el.name.clone())))?;
    Ok(())
}
