//! Minimal owned markup tree used as the structural substrate for row sets.
//!
//! This is intentionally not an HTML parser: fixtures are well-formed XML and
//! anything else is rejected with explicit diagnostics so structural behavior
//! stays deterministic. Only the handful of concepts the row engine needs are
//! modeled (attributes, classes, a visibility flag, checked state, text).

use anyhow::{Result, anyhow};
use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Text,
    Checkbox,
    Radio,
    Hidden,
    Select,
    TextArea,
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub tag: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub children: Vec<Element>,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub checked: bool,
}

impl Element {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            ..Self::default()
        }
    }

    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attrs.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.add_class(class);
        self
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn with_child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(|s| s.as_str())
    }

    pub fn set_attr(&mut self, key: &str, value: &str) {
        self.attrs.insert(key.to_string(), value.to_string());
    }

    pub fn remove_attr(&mut self, key: &str) {
        self.attrs.remove(key);
    }

    pub fn name(&self) -> Option<&str> {
        self.attr("name")
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id")
    }

    pub fn for_target(&self) -> Option<&str> {
        self.attr("for")
    }

    pub fn value(&self) -> String {
        if self.tag == "textarea" {
            self.text.clone()
        } else {
            self.attr("value").unwrap_or_default().to_string()
        }
    }

    pub fn set_value(&mut self, value: &str) {
        if self.tag == "textarea" {
            self.text = value.to_string();
        } else {
            self.set_attr("value", value);
        }
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    pub fn add_class(&mut self, class: &str) {
        for part in class.split_whitespace() {
            if !self.has_class(part) {
                self.classes.push(part.to_string());
            }
        }
    }

    pub fn remove_class(&mut self, class: &str) {
        let parts: Vec<&str> = class.split_whitespace().collect();
        self.classes.retain(|c| !parts.contains(&c.as_str()));
    }

    pub fn hide(&mut self) {
        self.hidden = true;
    }

    pub fn show(&mut self) {
        self.hidden = false;
    }

    pub fn is_visible(&self) -> bool {
        !self.hidden
    }

    pub fn control_kind(&self) -> ControlKind {
        match self.tag.as_str() {
            "select" => ControlKind::Select,
            "textarea" => ControlKind::TextArea,
            "input" => match self.attr("type").unwrap_or("text") {
                "checkbox" => ControlKind::Checkbox,
                "radio" => ControlKind::Radio,
                "hidden" => ControlKind::Hidden,
                _ => ControlKind::Text,
            },
            _ => ControlKind::Other,
        }
    }

    pub fn is_form_control(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "select" | "textarea")
    }

    /// Matches the child-element set the row scanner cares about.
    pub fn is_field_like(&self) -> bool {
        matches!(
            self.tag.as_str(),
            "input" | "select" | "textarea" | "label" | "div"
        )
    }

    pub fn visit<F: FnMut(&Element)>(&self, f: &mut F) {
        f(self);
        for child in &self.children {
            child.visit(f);
        }
    }

    pub fn visit_mut<F: FnMut(&mut Element)>(&mut self, f: &mut F) {
        f(self);
        for child in &mut self.children {
            child.visit_mut(f);
        }
    }

    pub fn find_first<F: Fn(&Element) -> bool + Copy>(&self, pred: F) -> Option<&Element> {
        if pred(self) {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find_first(pred))
    }

    pub fn find_first_mut<F: Fn(&Element) -> bool + Copy>(
        &mut self,
        pred: F,
    ) -> Option<&mut Element> {
        if pred(self) {
            return Some(self);
        }
        self.children
            .iter_mut()
            .find_map(|c| c.find_first_mut(pred))
    }

    pub fn count<F: Fn(&Element) -> bool + Copy>(&self, pred: F) -> usize {
        let mut n = 0;
        self.visit(&mut |e| {
            if pred(e) {
                n += 1;
            }
        });
        n
    }

    /// Removes every descendant (not self) matching the predicate.
    pub fn remove_descendants<F: Fn(&Element) -> bool + Copy>(&mut self, pred: F) {
        self.children.retain(|c| !pred(c));
        for child in &mut self.children {
            child.remove_descendants(pred);
        }
    }

    pub fn has_child_fields(&self) -> bool {
        self.children
            .iter()
            .any(|c| c.find_first(|e| e.is_field_like()).is_some())
    }

    pub fn from_xml_file(path: &str) -> Result<Element> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("Could not read markup file '{path}': {e}"))?;
        Element::from_xml_str(&text).map_err(|e| anyhow!("Could not parse markup '{path}': {e}"))
    }

    pub fn from_xml_str(xml: &str) -> Result<Element> {
        let mut reader = Reader::from_str(xml);
        let config = reader.config_mut();
        config.trim_text_start = true;
        config.trim_text_end = true;

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;
        loop {
            match reader.read_event() {
                Ok(Event::Start(start)) => {
                    stack.push(element_from_tag(&start)?);
                }
                Ok(Event::Empty(start)) => {
                    let elem = element_from_tag(&start)?;
                    attach(&mut stack, &mut root, elem)?;
                }
                Ok(Event::End(_)) => {
                    let elem = stack
                        .pop()
                        .ok_or_else(|| anyhow!("Unbalanced closing tag in markup"))?;
                    attach(&mut stack, &mut root, elem)?;
                }
                Ok(Event::Text(text)) => {
                    if let Some(parent) = stack.last_mut() {
                        let chunk = text
                            .unescape()
                            .map_err(|e| anyhow!("Invalid text content: {e}"))?;
                        if !parent.text.is_empty() {
                            parent.text.push(' ');
                        }
                        parent.text.push_str(chunk.trim());
                    }
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(e) => return Err(anyhow!("Malformed markup: {e}")),
            }
        }
        if !stack.is_empty() {
            return Err(anyhow!("Unclosed element in markup"));
        }
        root.ok_or_else(|| anyhow!("Markup contains no root element"))
    }

    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        write_element(&mut writer, self)?;
        let bytes = writer.into_inner();
        String::from_utf8(bytes).map_err(|e| anyhow!("Markup is not valid UTF-8: {e}"))
    }

    pub fn to_xml_file(&self, path: &str) -> Result<()> {
        let text = self.to_xml_string()?;
        std::fs::write(path, text)
            .map_err(|e| anyhow!("Could not write markup file '{path}': {e}"))
    }
}

fn element_from_tag(start: &BytesStart<'_>) -> Result<Element> {
    let tag = String::from_utf8_lossy(start.name().as_ref()).to_string();
    let mut elem = Element::new(&tag);
    for attr in start.attributes() {
        let attr = attr.map_err(|e| anyhow!("Bad attribute on <{tag}>: {e}"))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
        let value = attr
            .unescape_value()
            .map_err(|e| anyhow!("Bad attribute value on <{tag}>: {e}"))?
            .to_string();
        match key.as_str() {
            "class" => elem.add_class(&value),
            "hidden" => elem.hidden = true,
            "checked" => elem.checked = true,
            _ => {
                elem.attrs.insert(key, value);
            }
        }
    }
    Ok(elem)
}

fn attach(stack: &mut Vec<Element>, root: &mut Option<Element>, elem: Element) -> Result<()> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(elem);
        return Ok(());
    }
    if root.is_some() {
        return Err(anyhow!("Markup has more than one root element"));
    }
    *root = Some(elem);
    Ok(())
}

fn write_element(writer: &mut Writer<Vec<u8>>, elem: &Element) -> Result<()> {
    let mut start = BytesStart::new(elem.tag.as_str());
    for (key, value) in &elem.attrs {
        start.push_attribute((key.as_str(), value.as_str()));
    }
    if !elem.classes.is_empty() {
        start.push_attribute(("class", elem.classes.join(" ").as_str()));
    }
    if elem.hidden {
        start.push_attribute(("hidden", "hidden"));
    }
    if elem.checked {
        start.push_attribute(("checked", "checked"));
    }
    if elem.children.is_empty() && elem.text.is_empty() {
        writer.write_event(Event::Empty(start))?;
        return Ok(());
    }
    writer.write_event(Event::Start(start))?;
    if !elem.text.is_empty() {
        writer.write_event(Event::Text(BytesText::new(&elem.text)))?;
    }
    for child in &elem.children {
        write_element(writer, child)?;
    }
    writer.write_event(Event::End(BytesEnd::new(elem.tag.as_str())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: &str) -> Element {
        Element::new("input")
            .with_attr("type", "text")
            .with_attr("name", name)
    }

    #[test]
    fn test_class_helpers() {
        let mut e = Element::new("div");
        e.add_class("row odd");
        assert!(e.has_class("row"));
        assert!(e.has_class("odd"));
        e.add_class("row");
        assert_eq!(e.classes.len(), 2);
        e.remove_class("odd missing");
        assert!(!e.has_class("odd"));
        assert!(e.has_class("row"));
    }

    #[test]
    fn test_control_kind_from_tag_and_type() {
        assert_eq!(
            Element::new("input")
                .with_attr("type", "checkbox")
                .control_kind(),
            ControlKind::Checkbox
        );
        assert_eq!(
            Element::new("input").with_attr("type", "hidden").control_kind(),
            ControlKind::Hidden
        );
        assert_eq!(Element::new("input").control_kind(), ControlKind::Text);
        assert_eq!(Element::new("select").control_kind(), ControlKind::Select);
        assert_eq!(Element::new("label").control_kind(), ControlKind::Other);
    }

    #[test]
    fn test_textarea_value_lives_in_text() {
        let mut area = Element::new("textarea");
        area.set_value("hello");
        assert_eq!(area.text, "hello");
        assert_eq!(area.value(), "hello");
        let mut plain = input("a");
        plain.set_value("x");
        assert_eq!(plain.attr("value"), Some("x"));
    }

    #[test]
    fn test_remove_descendants_is_recursive() {
        let tree = Element::new("div")
            .with_child(Element::new("ul").with_class("errorlist"))
            .with_child(
                Element::new("div").with_child(Element::new("ul").with_class("errorlist")),
            )
            .with_child(input("a"));
        let mut tree = tree;
        tree.remove_descendants(|e| e.has_class("errorlist"));
        assert_eq!(tree.count(|e| e.has_class("errorlist")), 0);
        assert_eq!(tree.count(|e| e.tag == "input"), 1);
    }

    #[test]
    fn test_has_child_fields() {
        let row = Element::new("tr")
            .with_child(Element::new("td").with_child(input("item-0-name")));
        assert!(row.has_child_fields());
        let empty = Element::new("tr").with_child(Element::new("td"));
        assert!(!empty.has_child_fields());
    }

    #[test]
    fn test_xml_round_trip() {
        let xml = r#"<div class="group">
  <label for="id_item-0-name">Name</label>
  <input type="text" name="item-0-name" id="id_item-0-name" value="x"/>
  <input type="checkbox" name="item-0-DELETE" checked="checked"/>
</div>"#;
        let tree = Element::from_xml_str(xml).unwrap();
        assert_eq!(tree.tag, "div");
        assert!(tree.has_class("group"));
        assert_eq!(tree.children.len(), 3);
        assert_eq!(tree.children[0].text, "Name");
        assert!(tree.children[2].checked);

        let out = tree.to_xml_string().unwrap();
        let again = Element::from_xml_str(&out).unwrap();
        assert_eq!(tree, again);
    }

    #[test]
    fn test_hidden_attribute_round_trips() {
        let mut e = Element::new("tr");
        e.hide();
        let out = e.to_xml_string().unwrap();
        let again = Element::from_xml_str(&out).unwrap();
        assert!(again.hidden);
    }

    #[test]
    fn test_rejects_malformed_markup() {
        assert!(Element::from_xml_str("<div><input></div>").is_err());
        assert!(Element::from_xml_str("").is_err());
        assert!(Element::from_xml_str("<a/><b/>").is_err());
    }
}
