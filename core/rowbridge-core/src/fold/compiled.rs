use super::{FieldSource, FieldTargets, FoldCapture, FoldSpec};
use crate::error::{BridgeError, BridgeResult};
use crate::format::markup::Element;
use crate::schema::validate_identifier;
use crate::table::{Cell, Row};
use std::collections::{HashMap, HashSet};

/// Fold rule resolved to its output slot.
#[derive(Debug)]
struct LevelFold {
    slot: usize,
    capture: FoldCapture,
    attribute_name: String,
}

#[derive(Debug)]
enum Slots {
    Single(usize),
    Positional(Vec<usize>),
}

#[derive(Debug)]
struct CompiledField {
    source: FieldSource,
    slots: Slots,
}

/// A validated [`FoldSpec`] with every rule resolved to a path level and an
/// output column index.
#[derive(Debug)]
pub struct CompiledFold {
    record_path: Vec<String>,
    separator: String,
    columns: Vec<String>,
    /// Fold rules grouped by path level (0 = document root).
    levels: Vec<Vec<LevelFold>>,
    fold_width: usize,
    fields: Vec<CompiledField>,
    /// Tag name -> index into `fields`.
    tag_fields: HashMap<String, usize>,
}

impl CompiledFold {
    pub fn compile(spec: &FoldSpec) -> BridgeResult<Self> {
        let depth = spec.record_path.len();
        if depth == 0 {
            return Err(BridgeError::Configuration(
                "markup format requires a record path".to_string(),
            ));
        }
        if let Some(empty) = spec.record_path.iter().find(|n| n.is_empty()) {
            return Err(BridgeError::Configuration(format!(
                "record path contains an empty element name '{empty}'"
            )));
        }

        let mut columns = Vec::new();
        let mut levels: Vec<Vec<LevelFold>> = (0..depth).map(|_| Vec::new()).collect();

        for rule in &spec.folds {
            let n = rule.path.len();
            if n == 0 || n >= depth || rule.path[..] != spec.record_path[..n] {
                return Err(BridgeError::Configuration(format!(
                    "fold path '{}' for column '{}' is not an ancestor on record path '{}'",
                    rule.path.join(" "),
                    rule.column,
                    spec.record_path.join(" ")
                )));
            }
            if let FoldCapture::ChildText { tag } = &rule.capture
                && tag.is_empty()
            {
                return Err(BridgeError::Configuration(format!(
                    "fold for column '{}' names an empty child tag",
                    rule.column
                )));
            }
            levels[n - 1].push(LevelFold {
                slot: columns.len(),
                capture: rule.capture.clone(),
                attribute_name: rule.attribute_name.clone().unwrap_or_else(|| rule.column.clone()),
            });
            columns.push(rule.column.clone());
        }
        let fold_width = columns.len();

        // Attributes are written back in occurrence order, child text after.
        for level in &mut levels {
            level.sort_by_key(|fold| match fold.capture {
                FoldCapture::Attribute { occurrence } => (0, occurrence),
                FoldCapture::ChildText { .. } => (1, 0),
            });
        }

        let mut fields = Vec::with_capacity(spec.fields.len());
        let mut tag_fields = HashMap::new();
        let mut attribute_fields = HashSet::new();

        for mapping in &spec.fields {
            let source_name = mapping.source.name();
            if source_name.is_empty() {
                return Err(BridgeError::Configuration(
                    "field mapping has an empty source name".to_string(),
                ));
            }
            let fresh = match &mapping.source {
                FieldSource::Tag(tag) => tag_fields.insert(tag.clone(), fields.len()).is_none(),
                FieldSource::Attribute(attr) => attribute_fields.insert(attr.clone()),
            };
            if !fresh {
                return Err(BridgeError::Configuration(format!(
                    "'{source_name}' is mapped more than once"
                )));
            }

            let slots = match &mapping.targets {
                FieldTargets::Single(column) => {
                    columns.push(column.clone());
                    Slots::Single(columns.len() - 1)
                }
                FieldTargets::Positional(_) if matches!(mapping.source, FieldSource::Attribute(_)) => {
                    return Err(BridgeError::Configuration(format!(
                        "attribute '{source_name}' can only map to a single column"
                    )));
                }
                FieldTargets::Positional(targets) if targets.is_empty() => {
                    return Err(BridgeError::Configuration(format!(
                        "tag '{source_name}' maps to an empty column list"
                    )));
                }
                FieldTargets::Positional(targets) => {
                    let start = columns.len();
                    columns.extend(targets.iter().cloned());
                    Slots::Positional((start..columns.len()).collect())
                }
            };
            fields.push(CompiledField {
                source: mapping.source.clone(),
                slots,
            });
        }

        let mut seen = HashSet::new();
        for column in &columns {
            validate_identifier(column)?;
            if !seen.insert(column.as_str()) {
                return Err(BridgeError::Configuration(format!(
                    "column '{column}' is produced by more than one mapping"
                )));
            }
        }

        Ok(Self {
            record_path: spec.record_path.clone(),
            separator: spec.separator.clone(),
            columns,
            levels,
            fold_width,
            fields,
            tag_fields,
        })
    }

    /// Output columns: fold columns in rule order, then field columns in
    /// mapping order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    fn last_level(&self) -> usize {
        self.record_path.len() - 1
    }

    // ════════════════════════════════════════════
    // Decode
    // ════════════════════════════════════════════

    /// One record per element reached through the exact record path, in
    /// document order. Every record is exactly [`columns`](Self::columns)
    /// wide.
    pub fn flatten(&self, root: &Element) -> BridgeResult<Vec<Vec<Cell>>> {
        if root.name != self.record_path[0] {
            return Err(BridgeError::Schema(format!(
                "document root <{}> does not match record path '{}'",
                root.name,
                self.record_path.join(" ")
            )));
        }
        let mut context = vec![None; self.fold_width];
        let mut records = Vec::new();
        self.walk(root, 0, &mut context, &mut records);
        Ok(records)
    }

    fn walk(
        &self,
        element: &Element,
        level: usize,
        context: &mut Vec<Cell>,
        records: &mut Vec<Vec<Cell>>,
    ) {
        // Entering an element at `level` overwrites every slot of that level,
        // so siblings never see each other's values.
        for fold in &self.levels[level] {
            context[fold.slot] = match &fold.capture {
                FoldCapture::Attribute { occurrence } => {
                    element.attribute_at(*occurrence).map(str::to_string)
                }
                FoldCapture::ChildText { tag } => element
                    .child_elements()
                    .find(|child| child.name == *tag)
                    .map(Element::text),
            };
        }

        if level == self.last_level() {
            records.push(self.record(element, context));
            return;
        }
        let next = &self.record_path[level + 1];
        for child in element.child_elements().filter(|c| c.name == *next) {
            self.walk(child, level + 1, context, records);
        }
    }

    fn record(&self, element: &Element, context: &[Cell]) -> Vec<Cell> {
        let mut record = context.to_vec();
        record.resize(self.columns.len(), None);

        for field in &self.fields {
            if let (FieldSource::Attribute(name), Slots::Single(slot)) = (&field.source, &field.slots) {
                record[*slot] = element.attribute(name).map(str::to_string);
            }
        }

        let mut occurrences = vec![0usize; self.fields.len()];
        element.for_each_descendant(&mut |child| {
            let Some(&idx) = self.tag_fields.get(child.name.as_str()) else {
                return;
            };
            let value = child.text();
            match &self.fields[idx].slots {
                Slots::Single(slot) => match &mut record[*slot] {
                    Some(existing) => {
                        existing.push_str(&self.separator);
                        existing.push_str(&value);
                    }
                    empty => *empty = Some(value),
                },
                Slots::Positional(slots) => {
                    if let Some(slot) = slots.get(occurrences[idx]) {
                        record[*slot] = Some(value);
                    }
                    occurrences[idx] += 1;
                }
            }
        });
        record
    }

    // ════════════════════════════════════════════
    // Encode
    // ════════════════════════════════════════════

    /// Rebuild a tree from rows. Consecutive rows with equal fold values at
    /// a level share one ancestor element at that level; root-level folds
    /// are taken from the first row.
    pub fn encode(&self, columns: &[String], rows: &[Row]) -> BridgeResult<Element> {
        if self.record_path.len() < 2 {
            return Err(BridgeError::Configuration(
                "encoding markup needs a record path below the document root".to_string(),
            ));
        }

        let mut positions: Vec<Option<usize>> = vec![None; self.columns.len()];
        for (pos, column) in columns.iter().enumerate() {
            let slot = self
                .columns
                .iter()
                .position(|c| c == column)
                .ok_or_else(|| {
                    BridgeError::Schema(format!(
                        "column '{column}' has no place in the markup layout"
                    ))
                })?;
            positions[slot] = Some(pos);
        }
        let aligned: Vec<Vec<Cell>> = rows
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|pos| pos.and_then(|p| row.get(p)).map(str::to_string))
                    .collect()
            })
            .collect();

        let mut root = Element::new(self.record_path[0].as_str());
        if let Some(first) = aligned.first() {
            self.decorate(&mut root, 0, first);
        }
        self.build(&mut root, 1, &aligned);
        Ok(root)
    }

    fn level_key<'r>(&self, level: usize, record: &'r [Cell]) -> Vec<&'r Cell> {
        self.levels[level].iter().map(|fold| &record[fold.slot]).collect()
    }

    fn build(&self, parent: &mut Element, level: usize, records: &[Vec<Cell>]) {
        if level == self.last_level() {
            for record in records {
                parent.push_child(self.record_element(record));
            }
            return;
        }

        let mut start = 0;
        while start < records.len() {
            let key = self.level_key(level, &records[start]);
            let len = records[start..]
                .iter()
                .take_while(|r| self.level_key(level, r) == key)
                .count();
            let group = &records[start..start + len];

            let mut element = Element::new(self.record_path[level].as_str());
            self.decorate(&mut element, level, &group[0]);
            self.build(&mut element, level + 1, group);
            parent.push_child(element);
            start += len;
        }
    }

    fn decorate(&self, element: &mut Element, level: usize, record: &[Cell]) {
        for fold in &self.levels[level] {
            let Some(value) = &record[fold.slot] else {
                continue;
            };
            match &fold.capture {
                FoldCapture::Attribute { .. } => element
                    .attributes
                    .push((fold.attribute_name.clone(), value.clone())),
                FoldCapture::ChildText { tag } => {
                    let mut child = Element::new(tag.as_str());
                    child.push_text(value.as_str());
                    element.push_child(child);
                }
            }
        }
    }

    fn record_element(&self, record: &[Cell]) -> Element {
        let mut element = Element::new(self.record_path[self.last_level()].as_str());
        for field in &self.fields {
            match (&field.source, &field.slots) {
                (FieldSource::Attribute(name), Slots::Single(slot)) => {
                    if let Some(value) = &record[*slot] {
                        element.attributes.push((name.clone(), value.clone()));
                    }
                }
                (FieldSource::Tag(tag), Slots::Single(slot)) => {
                    push_tag(&mut element, tag, &record[*slot]);
                }
                (FieldSource::Tag(tag), Slots::Positional(slots)) => {
                    for slot in slots {
                        push_tag(&mut element, tag, &record[*slot]);
                    }
                }
                (FieldSource::Attribute(_), Slots::Positional(_)) => {}
            }
        }
        element
    }
}

fn push_tag(parent: &mut Element, tag: &str, value: &Cell) {
    if let Some(value) = value {
        let mut child = Element::new(tag);
        child.push_text(value.as_str());
        parent.push_child(child);
    }
}
