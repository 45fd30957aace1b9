use std::sync::OnceLock;

use regex::Regex;

/// One value of a `key: value` entry; comma-separated values collapse
/// into `Many`.
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Single(String),
    Many(Vec<String>),
}

impl OptionValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            OptionValue::Single(value) => Some(value),
            OptionValue::Many(_) => None,
        }
    }

    fn render(&self) -> String {
        match self {
            OptionValue::Single(value) => value.clone(),
            OptionValue::Many(values) => values.join(", "),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
enum OptionsBody {
    #[default]
    Absent,
    Text(String),
    Map(Vec<(String, OptionValue)>),
}

#[derive(Debug, Clone, PartialEq)]
struct DynamicKeyword {
    /// Lowercased lookup key.
    key: String,
    /// Case-preserving spelling, kept for write-back.
    original: String,
    values: Option<Vec<(String, OptionValue)>>,
}

/// Outcome of parsing the description blocks. `view_definitions` stays
/// `None` when the text did not conform to the block grammar.
#[derive(Debug, Clone, PartialEq, Default)]
struct DescriptionInfo {
    view_definitions: Option<Vec<String>>,
    comments: Vec<String>,
    exchange_requirements: String,
    options: OptionsBody,
    dynamic: Vec<DynamicKeyword>,
    keywords: Vec<String>,
}

impl DescriptionInfo {
    fn parse(text: &str) -> DescriptionInfo {
        parse_blocks(text)
            .and_then(interpret_blocks)
            .unwrap_or_default()
    }

    fn add_keyword(&mut self, keyword: &str) {
        if !self.keywords.iter().any(|k| k == keyword) {
            self.keywords.push(keyword.to_string());
        }
    }
}

/// Splits the text into `KEYWORD [ body ]` blocks. Bodies may not nest.
fn parse_blocks(text: &str) -> Option<Vec<(String, String)>> {
    let mut rest = text.trim_start();
    let mut blocks = Vec::new();

    while !rest.is_empty() {
        let keyword_end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if keyword_end == 0 {
            return None;
        }
        let keyword = &rest[..keyword_end];

        rest = rest[keyword_end..].trim_start();
        rest = rest.strip_prefix('[')?;
        let body_end = rest.find(['[', ']'])?;
        if !rest[body_end..].starts_with(']') {
            return None;
        }
        let body = &rest[..body_end];
        if body.trim().is_empty() {
            return None;
        }

        blocks.push((keyword.to_string(), body.to_string()));
        rest = rest[body_end + 1..].trim_start();
    }

    if blocks.is_empty() {
        None
    } else {
        Some(blocks)
    }
}

fn interpret_blocks(blocks: Vec<(String, String)>) -> Option<DescriptionInfo> {
    let mut info = DescriptionInfo::default();

    for (keyword, body) in blocks {
        match keyword.as_str() {
            "ViewDefinition" => {
                let values = parse_value_list(&body)?;
                info.add_keyword("view_definitions");
                info.view_definitions
                    .get_or_insert_with(Vec::new)
                    .extend(values);
            }
            "Comment" => {
                let values = parse_value_list(&body)?;
                info.add_keyword("comments");
                info.comments.extend(values);
            }
            "ExchangeRequirement" => {
                info.add_keyword("exchange_requirements");
                info.exchange_requirements = normalize_whitespace(&body);
            }
            "Option" => {
                info.add_keyword("options");
                info.options = match parse_key_values(&body) {
                    Some(entries) => OptionsBody::Map(entries),
                    None => OptionsBody::Text(normalize_whitespace(&body)),
                };
            }
            _ => {
                let key = keyword.to_lowercase();
                info.add_keyword(&key);
                let entry = DynamicKeyword {
                    key: key.clone(),
                    original: keyword,
                    values: parse_key_values(&body),
                };
                match info.dynamic.iter_mut().find(|d| d.key == key) {
                    Some(existing) => *existing = entry,
                    None => info.dynamic.push(entry),
                }
            }
        }
    }

    Some(info)
}

/// Comma-separated bare values; names admit letters, digits, space, `_`,
/// `.` and `-`.
fn parse_value_list(body: &str) -> Option<Vec<String>> {
    let mut values = Vec::new();
    for piece in body.split(',') {
        let value = piece.trim();
        if value.is_empty()
            || !value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || " _.-".contains(c))
        {
            return None;
        }
        values.push(value.to_string());
    }
    Some(values)
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

static KEY_VALUE: OnceLock<Regex> = OnceLock::new();

/// Parses `key: value(, value)*(; key: value)*` into an ordered map;
/// duplicate keys keep the last value.
fn parse_key_values(text: &str) -> Option<Vec<(String, OptionValue)>> {
    let re = KEY_VALUE.get_or_init(|| Regex::new(r"\w+\s*:\s*[^:]+").unwrap());
    if !re.is_match(text) {
        return None;
    }

    let mut entries: Vec<(String, OptionValue)> = Vec::new();
    for pair in text.split(';') {
        if let Some((key, value)) = pair.split_once(':') {
            let key = key.trim().to_string();
            let values: Vec<String> = value.split(',').map(|v| v.trim().to_string()).collect();
            let value = if values.len() == 1 {
                OptionValue::Single(values[0].clone())
            } else {
                OptionValue::Many(values)
            };
            match entries.iter_mut().find(|(k, _)| *k == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
    }
    Some(entries)
}

/// Mutable model-view-definition view over the header's description lines.
///
/// Reads parse lazily. Every write rewrites the matching `KEYWORD [...]`
/// description line in place (appending one when none matches) and drops
/// the parse cache; the next read rebuilds it. Single-writer by design.
pub struct MvdInfo<'h> {
    description: &'h mut Vec<String>,
    parsed: Option<DescriptionInfo>,
}

impl<'h> MvdInfo<'h> {
    pub(crate) fn new(description: &'h mut Vec<String>) -> Self {
        MvdInfo {
            description,
            parsed: None,
        }
    }

    fn ensure_parsed(&mut self) {
        if self.parsed.is_none() {
            self.parsed = Some(if self.description.is_empty() {
                DescriptionInfo {
                    view_definitions: Some(Vec::new()),
                    ..Default::default()
                }
            } else {
                DescriptionInfo::parse(&self.description.join(" "))
            });
        }
    }

    /// The underlying description lines.
    pub fn description(&self) -> &[String] {
        self.description
    }

    pub fn set_description(&mut self, lines: Vec<String>) {
        *self.description = lines;
        self.parsed = None;
    }

    /// The declared view definitions, or `None` when the description does
    /// not parse as keyword blocks.
    pub fn view_definitions(&mut self) -> Option<AutoCommitList<'_, 'h>> {
        self.ensure_parsed();
        let items = self.parsed.as_ref()?.view_definitions.clone()?;
        Some(AutoCommitList {
            items,
            keyword: "ViewDefinition",
            joiner: ",",
            mvd: self,
        })
    }

    pub fn set_view_definitions(&mut self, values: &[&str]) {
        self.update_keyword("ViewDefinition", &values.join(", "));
    }

    pub fn comments(&mut self) -> AutoCommitList<'_, 'h> {
        self.ensure_parsed();
        let items = self
            .parsed
            .as_ref()
            .map(|p| p.comments.clone())
            .unwrap_or_default();
        AutoCommitList {
            items,
            keyword: "Comment",
            joiner: ", ",
            mvd: self,
        }
    }

    pub fn set_comments(&mut self, values: &[&str]) {
        self.update_keyword("Comment", &values.join(", "));
    }

    pub fn exchange_requirements(&mut self) -> Option<String> {
        self.ensure_parsed();
        self.parsed.as_ref().and_then(|p| {
            if p.exchange_requirements.is_empty() {
                None
            } else {
                Some(p.exchange_requirements.clone())
            }
        })
    }

    pub fn set_exchange_requirements(&mut self, value: &str) {
        self.update_keyword("ExchangeRequirement", value);
    }

    /// The `Option [...]` block, either as opaque text or as a key/value
    /// map that writes back on mutation.
    pub fn options(&mut self) -> Option<MvdOptions<'_, 'h>> {
        self.ensure_parsed();
        let body = self
            .parsed
            .as_ref()
            .map(|p| p.options.clone())
            .unwrap_or_default();
        match body {
            OptionsBody::Absent => None,
            OptionsBody::Text(text) => Some(MvdOptions::Text(text)),
            OptionsBody::Map(entries) => Some(MvdOptions::Map(KeywordMap {
                entries,
                keyword: "Option".to_string(),
                mvd: self,
            })),
        }
    }

    pub fn set_options(&mut self, value: &str) {
        self.update_keyword("Option", value);
    }

    /// Keywords seen by the last parse, lowercased, in encounter order.
    pub fn keywords(&mut self) -> Vec<String> {
        self.ensure_parsed();
        self.parsed
            .as_ref()
            .map(|p| p.keywords.clone())
            .unwrap_or_default()
    }

    /// Key/value view of a non-standard block, looked up by its lowercased
    /// name. Writes go back under the original spelling.
    pub fn keyword(&mut self, name: &str) -> Option<KeywordMap<'_, 'h>> {
        self.ensure_parsed();
        let wanted = name.to_lowercase();
        let (entries, original) = {
            let parsed = self.parsed.as_ref()?;
            let entry = parsed.dynamic.iter().find(|d| d.key == wanted)?;
            (entry.values.clone()?, entry.original.clone())
        };
        Some(KeywordMap {
            entries,
            keyword: original,
            mvd: self,
        })
    }

    /// Rewrites the `keyword [...]` description line in place, appending a
    /// new line when none matches, then drops the parse cache.
    pub fn update_keyword(&mut self, keyword: &str, new_value: &str) {
        let prefix = format!("{} [", keyword);
        let new_line = format!("{} [{}]", keyword, new_value);
        let mut updated = false;

        for line in self.description.iter_mut() {
            if line.trim_start().starts_with(&prefix) {
                *line = new_line.clone();
                updated = true;
            }
        }
        if !updated {
            self.description.push(new_line);
        }
        self.parsed = None;
    }
}

/// Either the opaque text or the key/value map of an `Option [...]` block.
pub enum MvdOptions<'m, 'h> {
    Text(String),
    Map(KeywordMap<'m, 'h>),
}

/// Sequence view that rewrites its description line on every mutation.
pub struct AutoCommitList<'m, 'h> {
    items: Vec<String>,
    keyword: &'static str,
    joiner: &'static str,
    mvd: &'m mut MvdInfo<'h>,
}

impl AutoCommitList<'_, '_> {
    pub fn push(&mut self, item: impl Into<String>) {
        self.items.push(item.into());
        self.commit();
    }

    pub fn extend<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items.extend(items.into_iter().map(Into::into));
        self.commit();
    }

    pub fn insert(&mut self, index: usize, item: impl Into<String>) {
        self.items.insert(index, item.into());
        self.commit();
    }

    pub fn set(&mut self, index: usize, item: impl Into<String>) {
        self.items[index] = item.into();
        self.commit();
    }

    pub fn remove(&mut self, index: usize) -> String {
        let removed = self.items.remove(index);
        self.commit();
        removed
    }

    pub fn pop(&mut self) -> Option<String> {
        let popped = self.items.pop();
        self.commit();
        popped
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.commit();
    }

    fn commit(&mut self) {
        let joined = self.items.join(self.joiner);
        self.mvd.update_keyword(self.keyword, &joined);
    }
}

impl std::ops::Deref for AutoCommitList<'_, '_> {
    type Target = [String];

    fn deref(&self) -> &[String] {
        &self.items
    }
}

/// Key/value view over a `key: value; ...` block, committing on write.
pub struct KeywordMap<'m, 'h> {
    entries: Vec<(String, OptionValue)>,
    keyword: String,
    mvd: &'m mut MvdInfo<'h>,
}

impl KeywordMap<'_, '_> {
    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set(&mut self, key: &str, value: OptionValue) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
        self.commit();
    }

    pub fn remove(&mut self, key: &str) -> Option<OptionValue> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        let (_, value) = self.entries.remove(position);
        self.commit();
        Some(value)
    }

    fn commit(&mut self) {
        let rendered = self
            .entries
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value.render()))
            .collect::<Vec<_>>()
            .join("; ");
        let keyword = self.keyword.clone();
        self.mvd.update_keyword(&keyword, &rendered);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn mvd_over(lines: &[&str]) -> Vec<String> {
        lines.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_view_definitions_and_dynamic_keyword() {
        let mut description = mvd_over(&[
            "ViewDefinition [ReferenceView_V1.2, Alignment] Remark [SomeKey: SomeValue]",
        ]);
        let mut mvd = MvdInfo::new(&mut description);

        let views = mvd.view_definitions().unwrap();
        assert_eq!(&*views, &["ReferenceView_V1.2", "Alignment"]);

        let remark = mvd.keyword("Remark").unwrap();
        assert_eq!(
            remark.get("SomeKey"),
            Some(&OptionValue::Single("SomeValue".to_string()))
        );

        // lookup is case-insensitive on the block name
        assert!(mvd.keyword("remark").is_some());
        assert!(mvd.keyword("absent").is_none());

        assert_eq!(
            mvd.keywords(),
            vec!["view_definitions".to_string(), "remark".to_string()]
        );
    }

    #[test]
    fn test_comments_and_exchange_requirements() {
        let mut description = mvd_over(&[
            "Comment [First note, Second note]",
            "ExchangeRequirement [Architecture   Reference]",
        ]);
        let mut mvd = MvdInfo::new(&mut description);

        assert_eq!(&*mvd.comments(), &["First note", "Second note"]);
        assert_eq!(
            mvd.exchange_requirements().unwrap(),
            "Architecture Reference"
        );
    }

    #[test]
    fn test_options_map_and_opaque() {
        let mut description = mvd_over(&["Option [Split: true; Merge: a, b]"]);
        let mut mvd = MvdInfo::new(&mut description);
        match mvd.options().unwrap() {
            MvdOptions::Map(map) => {
                assert_eq!(
                    map.get("Split"),
                    Some(&OptionValue::Single("true".to_string()))
                );
                assert_eq!(
                    map.get("Merge"),
                    Some(&OptionValue::Many(vec!["a".to_string(), "b".to_string()]))
                );
            }
            MvdOptions::Text(text) => panic!("expected map, got text {:?}", text),
        }

        let mut description = mvd_over(&["Option [drawing export only]"]);
        let mut mvd = MvdInfo::new(&mut description);
        match mvd.options().unwrap() {
            MvdOptions::Text(text) => assert_eq!(text, "drawing export only"),
            MvdOptions::Map(_) => panic!("expected opaque text"),
        }
    }

    #[test]
    fn test_unparsable_description() {
        let mut description = mvd_over(&["not a keyword block @@"]);
        let mut mvd = MvdInfo::new(&mut description);
        assert!(mvd.view_definitions().is_none());
        assert!(mvd.options().is_none());
    }

    #[test]
    fn test_empty_description() {
        let mut description = Vec::new();
        let mut mvd = MvdInfo::new(&mut description);
        let views = mvd.view_definitions().unwrap();
        assert!(views.is_empty());
    }

    #[test]
    fn test_view_definition_mutation_writes_back() {
        let mut description = mvd_over(&["ViewDefinition [ReferenceView]"]);
        {
            let mut mvd = MvdInfo::new(&mut description);
            let mut views = mvd.view_definitions().unwrap();
            views.push("Alignment");
        }
        assert_eq!(description, vec!["ViewDefinition [ReferenceView,Alignment]"]);

        // the cache is rebuilt on the next read
        let mut mvd = MvdInfo::new(&mut description);
        let views = mvd.view_definitions().unwrap();
        assert_eq!(&*views, &["ReferenceView", "Alignment"]);
    }

    #[test]
    fn test_comment_mutation_uses_comma_space() {
        let mut description = mvd_over(&["Comment [one]"]);
        let mut mvd = MvdInfo::new(&mut description);
        let mut comments = mvd.comments();
        comments.push("two");
        comments.pop();
        comments.extend(["three"]);
        drop(comments);

        assert_eq!(mvd.description(), &["Comment [one, three]"]);
    }

    #[test]
    fn test_update_appends_missing_keyword() {
        let mut description = Vec::new();
        let mut mvd = MvdInfo::new(&mut description);
        mvd.set_comments(&["note"]);
        mvd.set_view_definitions(&["ReferenceView", "Alignment"]);

        assert_eq!(
            description,
            vec![
                "Comment [note]".to_string(),
                "ViewDefinition [ReferenceView, Alignment]".to_string(),
            ]
        );
    }

    #[test]
    fn test_keyword_map_set_commits_under_original_spelling() {
        let mut description = mvd_over(&["Remark [SomeKey: SomeValue]"]);
        let mut mvd = MvdInfo::new(&mut description);
        let mut remark = mvd.keyword("remark").unwrap();
        remark.set("Other", OptionValue::Single("x".to_string()));

        assert_eq!(
            mvd.description(),
            &["Remark [SomeKey: SomeValue; Other: x]"]
        );
        let remark = mvd.keyword("Remark").unwrap();
        assert_eq!(
            remark.get("Other"),
            Some(&OptionValue::Single("x".to_string()))
        );
    }

    #[test]
    fn test_keyword_map_remove() {
        let mut description = mvd_over(&["Option [Split: true; Merge: a]"]);
        let mut mvd = MvdInfo::new(&mut description);
        match mvd.options().unwrap() {
            MvdOptions::Map(mut map) => {
                assert!(map.remove("Split").is_some());
                assert!(map.remove("Split").is_none());
            }
            MvdOptions::Text(_) => panic!("expected map"),
        }
        assert_eq!(mvd.description(), &["Option [Merge: a]"]);
    }

    #[test]
    fn test_list_editing_operations() {
        let mut description = mvd_over(&["ViewDefinition [A, B, C]"]);
        let mut mvd = MvdInfo::new(&mut description);
        let mut views = mvd.view_definitions().unwrap();

        views.insert(1, "Inserted");
        assert_eq!(views.remove(0), "A");
        views.set(0, "First");
        drop(views);
        assert_eq!(mvd.description(), &["ViewDefinition [First,B,C]"]);

        let mut views = mvd.view_definitions().unwrap();
        views.clear();
        drop(views);
        // an emptied block no longer parses as a value list
        assert_eq!(mvd.description(), &["ViewDefinition []"]);
        assert!(mvd.view_definitions().is_none());
    }

    #[test]
    fn test_plain_setters() {
        let mut description = Vec::new();
        let mut mvd = MvdInfo::new(&mut description);
        mvd.set_exchange_requirements("Architecture");
        mvd.set_options("Split: true");
        assert_eq!(mvd.exchange_requirements().unwrap(), "Architecture");
        match mvd.options().unwrap() {
            MvdOptions::Map(map) => {
                assert_eq!(map.len(), 1);
                assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Split"]);
                assert!(!map.is_empty());
            }
            MvdOptions::Text(text) => panic!("expected map, got {:?}", text),
        }

        mvd.set_description(vec!["Comment [replaced]".to_string()]);
        assert_eq!(&*mvd.comments(), &["replaced"]);
        assert!(mvd.exchange_requirements().is_none());
    }

    #[test]
    fn test_multiple_view_definition_blocks_accumulate() {
        let mut description = mvd_over(&["ViewDefinition [A]", "ViewDefinition [B, C]"]);
        let mut mvd = MvdInfo::new(&mut description);
        let views = mvd.view_definitions().unwrap();
        assert_eq!(&*views, &["A", "B", "C"]);
    }
}
