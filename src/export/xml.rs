//! Small builders for the COLLADA elements every library repeats.
use std::fmt::Display;
use xmltree::{Element, XMLNode};

/// An element with the given attributes.
pub fn element(name: &str, attributes: &[(&str, &str)]) -> Element {
    let mut element = Element::new(name);
    for (key, value) in attributes {
        element
            .attributes
            .insert(key.to_string(), value.to_string());
    }
    element
}

/// An element containing a single text node.
pub fn text_element(name: &str, attributes: &[(&str, &str)], text: String) -> Element {
    let mut element = element(name, attributes);
    element.children.push(XMLNode::Text(text));
    element
}

pub fn push(parent: &mut Element, child: Element) {
    parent.children.push(XMLNode::Element(child));
}

/// An `<input>` referencing a source by id.
pub fn input(semantic: &str, source_id: &str, offset: Option<usize>, set: Option<usize>) -> Element {
    let source = format!("#{source_id}");
    let mut input = element("input", &[("semantic", semantic), ("source", source.as_str())]);
    if let Some(offset) = offset {
        input
            .attributes
            .insert("offset".to_string(), offset.to_string());
    }
    if let Some(set) = set {
        input.attributes.insert("set".to_string(), set.to_string());
    }
    input
}

/// A `<source>` holding a float array read through an accessor with one
/// float `<param>` per component name.
pub fn build_source_float_array(id: &str, flat_data: &[f32], params: &[&str]) -> Element {
    let stride = params.len().max(1);
    let array_id = format!("{id}-array");

    let mut source = element("source", &[("id", id)]);
    push(
        &mut source,
        text_element(
            "float_array",
            &[("id", array_id.as_str()), ("count", flat_data.len().to_string().as_str())],
            join_floats(flat_data),
        ),
    );

    let mut accessor = accessor(&array_id, flat_data.len() / stride, stride);
    for &name in params {
        push(&mut accessor, element("param", &[("name", name), ("type", "float")]));
    }
    push(&mut source, technique_common(accessor));
    source
}

/// A `<source>` of 4x4 matrices, 16 floats each.
pub fn build_source_mat4_array(id: &str, flat_data: &[f32]) -> Element {
    let array_id = format!("{id}-array");

    let mut source = element("source", &[("id", id)]);
    push(
        &mut source,
        text_element(
            "float_array",
            &[("id", array_id.as_str()), ("count", flat_data.len().to_string().as_str())],
            join_floats(flat_data),
        ),
    );

    let mut accessor = accessor(&array_id, flat_data.len() / 16, 16);
    push(
        &mut accessor,
        element("param", &[("name", "TRANSFORM"), ("type", "float4x4")]),
    );
    push(&mut source, technique_common(accessor));
    source
}

pub fn build_source_name_array(id: &str, names: &[String]) -> Element {
    let array_id = format!("{id}-array");

    let mut source = element("source", &[("id", id)]);
    push(
        &mut source,
        text_element(
            "Name_array",
            &[("id", array_id.as_str()), ("count", names.len().to_string().as_str())],
            names.join(" "),
        ),
    );

    let mut accessor = accessor(&array_id, names.len(), 1);
    push(&mut accessor, element("param", &[("name", "JOINT"), ("type", "name")]));
    push(&mut source, technique_common(accessor));
    source
}

fn accessor(array_id: &str, count: usize, stride: usize) -> Element {
    element(
        "accessor",
        &[
            ("source", format!("#{array_id}").as_str()),
            ("count", count.to_string().as_str()),
            ("stride", stride.to_string().as_str()),
        ],
    )
}

fn technique_common(child: Element) -> Element {
    let mut tech = Element::new("technique_common");
    push(&mut tech, child);
    tech
}

pub fn join_floats(values: &[f32]) -> String {
    values
        .iter()
        .map(|v| format_float(*v))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn join_values<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_float(v: f32) -> String {
    if v == 0.0 { "0".to_string() } else { format!("{:.6}", v) }
}
