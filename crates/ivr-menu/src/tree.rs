//! The validated, immutable menu tree.

use crate::definition::{MenuDefinition, NodeDef};
use crate::error::{MenuError, SchemaError};
use ivr_types::{DataCategory, Language, LocalizedText, NodeKind};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::path::Path;

/// Maximum number of selections between the root and any node.
pub const MAX_DEPTH: usize = 4;

/// A child reference, tagged with the key that selects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChildRef {
    pub selector: String,
    pub id: String,
}

/// Sensitive data required before the caller can proceed past a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthRequirement {
    /// Auth field id (e.g. `account_number`).
    pub field: String,
    /// The data category the field unlocks.
    pub protects: DataCategory,
    /// Caller-facing description in the node's language.
    pub description: String,
}

/// One node of the loaded tree.
#[derive(Debug, Clone, Serialize)]
pub struct MenuNode {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    /// Parent id, for lookup only. `None` for the root.
    pub parent: Option<String>,
    /// Key that selects this node from its parent. `None` for the root.
    pub selector: Option<String>,
    pub children: Vec<ChildRef>,
    pub auth_requirement: Option<AuthRequirement>,
    /// Number of selections from the root; the root itself is 0.
    pub depth: usize,
    /// Owning language subtree. `None` for the root.
    pub language: Option<Language>,
    pub intent: Option<String>,
    /// Label, intent phrases and node-local phrases, in that order.
    pub phrases: Vec<String>,
    pub slot_keys: Vec<String>,
}

impl MenuNode {
    /// Returns `true` if this node is a candidate answer to a caller request.
    pub fn is_resolvable(&self) -> bool {
        !self.kind.is_control() && self.kind != NodeKind::AgentTransfer
    }
}

/// A sensitive-data field definition.
#[derive(Debug, Clone, Serialize)]
pub struct AuthField {
    pub id: String,
    pub protects: DataCategory,
    pub prompts: LocalizedText,
}

impl AuthField {
    /// Returns the caller-facing prompt in the given language.
    pub fn prompt(&self, language: Language) -> Option<&str> {
        self.prompts.get(&language).map(String::as_str)
    }
}

/// What a security rule is attached to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleTarget {
    Node(String),
    Field(String),
}

/// A static disclosure rule.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityRule {
    pub target: RuleTarget,
    pub forbidden: BTreeSet<DataCategory>,
    pub required_fields: BTreeSet<String>,
}

impl SecurityRule {
    /// Returns `true` if the rule applies to the given node.
    pub fn applies_to(&self, node: &MenuNode) -> bool {
        match &self.target {
            RuleTarget::Node(id) => *id == node.id,
            RuleTarget::Field(field) => node
                .auth_requirement
                .as_ref()
                .is_some_and(|auth| auth.field == *field),
        }
    }
}

/// Footer markers every rendered response must carry exactly once.
#[derive(Debug, Clone, Serialize)]
pub struct Notices {
    pub return_marker: String,
    pub timeout_markers: LocalizedText,
}

impl Notices {
    /// Returns the timeout marker for a language.
    pub fn timeout_marker(&self, language: Language) -> Option<&str> {
        self.timeout_markers.get(&language).map(String::as_str)
    }
}

/// The IVR structure, loaded once and shared read-only across sessions.
#[derive(Debug, Clone)]
pub struct MenuTree {
    version: String,
    default_language: Language,
    nodes: Vec<MenuNode>,
    index: HashMap<String, usize>,
    root: usize,
    languages: BTreeMap<Language, String>,
    auth_fields: BTreeMap<String, AuthField>,
    intents: HashMap<String, Vec<String>>,
    security_rules: Vec<SecurityRule>,
    notices: Notices,
}

impl MenuTree {
    /// Parses and validates a TOML menu definition.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] describing the first violation found.
    pub fn load(definition: &str) -> Result<Self, SchemaError> {
        let definition: MenuDefinition = toml::from_str(definition)?;
        Self::from_definition(definition)
    }

    /// Reads, parses and validates a menu definition file.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Read`] if the file cannot be read, or any
    /// validation error from [`MenuTree::load`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let tree = Self::load(&contents)?;
        tracing::info!(
            path = %path.as_ref().display(),
            version = %tree.version,
            nodes = tree.nodes.len(),
            "loaded menu definition"
        );
        Ok(tree)
    }

    /// Validates an already-parsed definition and builds the tree.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] describing the first violation found.
    pub fn from_definition(definition: MenuDefinition) -> Result<Self, SchemaError> {
        let MenuDefinition {
            version,
            default_language,
            notices,
            auth_fields: auth_field_defs,
            intents: intent_defs,
            nodes: node_defs,
            security_rules: rule_defs,
        } = definition;

        let mut auth_fields = BTreeMap::new();
        for field in auth_field_defs {
            if auth_fields.contains_key(&field.id) {
                return Err(SchemaError::DuplicateAuthField(field.id));
            }
            auth_fields.insert(
                field.id.clone(),
                AuthField {
                    id: field.id,
                    protects: field.protects,
                    prompts: field.prompt,
                },
            );
        }

        let mut intents: HashMap<String, Vec<String>> = HashMap::new();
        for intent in intent_defs {
            if intents.contains_key(&intent.id) {
                return Err(SchemaError::DuplicateIntent(intent.id));
            }
            intents.insert(intent.id, intent.phrases);
        }

        let mut index = HashMap::with_capacity(node_defs.len());
        for (position, def) in node_defs.iter().enumerate() {
            if def.id.trim().is_empty() {
                return Err(SchemaError::EmptyField {
                    id: def.id.clone(),
                    field: "id",
                });
            }
            if def.label.trim().is_empty() {
                return Err(SchemaError::EmptyField {
                    id: def.id.clone(),
                    field: "label",
                });
            }
            if index.insert(def.id.clone(), position).is_some() {
                return Err(SchemaError::DuplicateId(def.id.clone()));
            }
        }

        let root = find_root(&node_defs)?;
        let children = link_children(&node_defs, &index)?;
        let (depths, languages_by_node) = walk_from_root(&node_defs, &children, root)?;

        let mut languages = BTreeMap::new();
        for &child in &children[root] {
            let def = &node_defs[child];
            let language = def
                .language
                .ok_or_else(|| SchemaError::MissingLanguage(def.id.clone()))?;
            if languages.insert(language, def.id.clone()).is_some() {
                return Err(SchemaError::DuplicateLanguage(language));
            }
        }
        if !languages.contains_key(&default_language) {
            return Err(SchemaError::MissingDefaultLanguage(default_language));
        }

        for field in auth_fields.values() {
            for language in languages.keys() {
                if field.prompt(*language).is_none_or(|p| p.trim().is_empty()) {
                    return Err(SchemaError::MissingPrompt {
                        field: field.id.clone(),
                        language: *language,
                    });
                }
            }
        }
        for language in languages.keys() {
            if !notices.timeout_markers.contains_key(language) {
                return Err(SchemaError::MissingTimeoutMarker(*language));
            }
        }

        let mut nodes = Vec::with_capacity(node_defs.len());
        for (position, def) in node_defs.into_iter().enumerate() {
            let language = languages_by_node[position];
            let auth_requirement = match &def.auth {
                Some(field_id) => {
                    let field = auth_fields.get(field_id).ok_or_else(|| {
                        SchemaError::UnknownAuthField {
                            id: def.id.clone(),
                            field: field_id.clone(),
                        }
                    })?;
                    let description = language
                        .and_then(|lang| field.prompt(lang))
                        .unwrap_or_default()
                        .to_string();
                    Some(AuthRequirement {
                        field: field.id.clone(),
                        protects: field.protects,
                        description,
                    })
                }
                None if def.sensitive => {
                    return Err(SchemaError::MissingAuthRequirement(def.id));
                }
                None => None,
            };

            let mut phrases = vec![def.label.clone()];
            if let Some(intent) = &def.intent {
                let intent_phrases =
                    intents
                        .get(intent)
                        .ok_or_else(|| SchemaError::UnknownIntent {
                            id: def.id.clone(),
                            intent: intent.clone(),
                        })?;
                phrases.extend(intent_phrases.iter().cloned());
            }
            phrases.extend(def.phrases);

            nodes.push(MenuNode {
                id: def.id,
                label: def.label,
                kind: def.kind,
                parent: def.parent,
                selector: def.selector.map(|s| s.trim().to_string()),
                children: Vec::new(),
                auth_requirement,
                depth: depths[position],
                language,
                intent: def.intent,
                phrases,
                slot_keys: def.slots,
            });
        }

        for (position, child_positions) in children.iter().enumerate() {
            let refs = child_positions
                .iter()
                .map(|&child| ChildRef {
                    selector: nodes[child].selector.clone().unwrap_or_default(),
                    id: nodes[child].id.clone(),
                })
                .collect();
            nodes[position].children = refs;
        }

        let mut security_rules = Vec::with_capacity(rule_defs.len());
        for rule in rule_defs {
            let target = match (rule.node, rule.field) {
                (Some(node), None) => {
                    if !index.contains_key(&node) {
                        return Err(SchemaError::InvalidRule(format!(
                            "rule targets unknown node '{node}'"
                        )));
                    }
                    RuleTarget::Node(node)
                }
                (None, Some(field)) => {
                    if !auth_fields.contains_key(&field) {
                        return Err(SchemaError::InvalidRule(format!(
                            "rule targets unknown auth field '{field}'"
                        )));
                    }
                    RuleTarget::Field(field)
                }
                _ => {
                    return Err(SchemaError::InvalidRule(
                        "a rule must name exactly one of `node` or `field`".to_string(),
                    ))
                }
            };
            if let Some(unknown) = rule
                .required_fields
                .iter()
                .find(|field| !auth_fields.contains_key(*field))
            {
                return Err(SchemaError::InvalidRule(format!(
                    "rule requires unknown auth field '{unknown}'"
                )));
            }
            security_rules.push(SecurityRule {
                target,
                forbidden: rule.forbidden,
                required_fields: rule.required_fields,
            });
        }

        Ok(Self {
            version,
            default_language,
            nodes,
            index,
            root,
            languages,
            auth_fields,
            intents,
            security_rules,
            notices: Notices {
                return_marker: notices.return_marker,
                timeout_markers: notices.timeout_markers,
            },
        })
    }

    /// Operator-assigned version of the loaded definition.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Language used for resolution until the caller selects one.
    pub fn default_language(&self) -> Language {
        self.default_language
    }

    /// The language-selection root.
    pub fn root(&self) -> &MenuNode {
        &self.nodes[self.root]
    }

    /// Every node, in definition order.
    pub fn nodes(&self) -> impl Iterator<Item = &MenuNode> {
        self.nodes.iter()
    }

    /// Languages offered by the root, in code order.
    pub fn languages(&self) -> impl Iterator<Item = Language> + '_ {
        self.languages.keys().copied()
    }

    /// The main-menu node of a language, if the tree offers it.
    pub fn language_node(&self, language: Language) -> Option<&MenuNode> {
        self.languages
            .get(&language)
            .and_then(|id| self.lookup(id).ok())
    }

    /// Looks a node up by id.
    ///
    /// # Errors
    ///
    /// Returns [`MenuError::NotFound`] if no node has this id.
    pub fn lookup(&self, id: &str) -> Result<&MenuNode, MenuError> {
        self.index
            .get(id)
            .map(|&position| &self.nodes[position])
            .ok_or_else(|| MenuError::NotFound(id.to_string()))
    }

    /// The children of a node, in definition order.
    ///
    /// # Errors
    ///
    /// Returns [`MenuError::NotFound`] if no node has this id.
    pub fn children_of(&self, id: &str) -> Result<Vec<&MenuNode>, MenuError> {
        let node = self.lookup(id)?;
        node.children
            .iter()
            .map(|child| self.lookup(&child.id))
            .collect()
    }

    /// The nodes from the root down to `id`, both included.
    ///
    /// # Errors
    ///
    /// Returns [`MenuError::NotFound`] if no node has this id.
    pub fn path_to(&self, id: &str) -> Result<Vec<&MenuNode>, MenuError> {
        let mut path = Vec::new();
        let mut current = Some(self.lookup(id)?);
        while let Some(node) = current {
            path.push(node);
            current = match &node.parent {
                Some(parent) => Some(self.lookup(parent)?),
                None => None,
            };
        }
        path.reverse();
        Ok(path)
    }

    /// The selections a caller makes to reach `id`: [`MenuTree::path_to`]
    /// without the root.
    ///
    /// # Errors
    ///
    /// Returns [`MenuError::NotFound`] if no node has this id.
    pub fn steps_to(&self, id: &str) -> Result<Vec<&MenuNode>, MenuError> {
        let mut path = self.path_to(id)?;
        path.remove(0);
        Ok(path)
    }

    /// Returns `true` if `id` is `ancestor` or lies below it.
    pub fn is_within(&self, id: &str, ancestor: &str) -> bool {
        let mut current = self.lookup(id).ok();
        while let Some(node) = current {
            if node.id == ancestor {
                return true;
            }
            current = node.parent.as_deref().and_then(|p| self.lookup(p).ok());
        }
        false
    }

    /// Auth field definitions, by id.
    pub fn auth_field(&self, id: &str) -> Option<&AuthField> {
        self.auth_fields.get(id)
    }

    /// Every auth field definition, ordered by id.
    pub fn auth_fields(&self) -> impl Iterator<Item = &AuthField> {
        self.auth_fields.values()
    }

    /// The synonym set of an intent.
    pub fn intent_phrases(&self, intent: &str) -> Option<&[String]> {
        self.intents.get(intent).map(Vec::as_slice)
    }

    /// All static security rules.
    pub fn security_rules(&self) -> &[SecurityRule] {
        &self.security_rules
    }

    /// Footer notice markers.
    pub fn notices(&self) -> &Notices {
        &self.notices
    }
}

fn find_root(defs: &[NodeDef]) -> Result<usize, SchemaError> {
    let roots: Vec<usize> = defs
        .iter()
        .enumerate()
        .filter(|(_, def)| def.parent.is_none())
        .map(|(position, _)| position)
        .collect();

    let root = match roots.as_slice() {
        [] => return Err(SchemaError::NoRoot),
        [root] => *root,
        many => {
            return Err(SchemaError::MultipleRoots(
                many.iter().map(|&p| defs[p].id.clone()).collect(),
            ))
        }
    };

    if defs[root].kind != NodeKind::LanguageSelect {
        return Err(SchemaError::RootKind {
            id: defs[root].id.clone(),
            kind: defs[root].kind,
        });
    }
    if let Some(def) = defs
        .iter()
        .enumerate()
        .find(|(position, def)| *position != root && def.kind == NodeKind::LanguageSelect)
        .map(|(_, def)| def)
    {
        return Err(SchemaError::MisplacedKind {
            id: def.id.clone(),
            kind: def.kind,
        });
    }
    Ok(root)
}

fn link_children(
    defs: &[NodeDef],
    index: &HashMap<String, usize>,
) -> Result<Vec<Vec<usize>>, SchemaError> {
    let mut children = vec![Vec::new(); defs.len()];
    let mut selectors: HashSet<(usize, String)> = HashSet::new();

    for (position, def) in defs.iter().enumerate() {
        let Some(parent_id) = &def.parent else {
            continue;
        };
        let &parent = index.get(parent_id).ok_or_else(|| SchemaError::UnknownParent {
            id: def.id.clone(),
            parent: parent_id.clone(),
        })?;
        if defs[parent].kind.is_terminal() {
            return Err(SchemaError::TerminalWithChildren {
                id: parent_id.clone(),
                kind: defs[parent].kind,
            });
        }
        let selector = def
            .selector
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| SchemaError::MissingSelector(def.id.clone()))?;
        if !selectors.insert((parent, selector.to_string())) {
            return Err(SchemaError::DuplicateSelector {
                parent: parent_id.clone(),
                selector: selector.to_string(),
            });
        }
        children[parent].push(position);
    }
    Ok(children)
}

/// Breadth-first walk from the root assigning depth and language.
///
/// Anything the walk does not reach hangs off a parent cycle.
#[allow(clippy::type_complexity)]
fn walk_from_root(
    defs: &[NodeDef],
    children: &[Vec<usize>],
    root: usize,
) -> Result<(Vec<usize>, Vec<Option<Language>>), SchemaError> {
    let mut depths = vec![usize::MAX; defs.len()];
    let mut languages = vec![None; defs.len()];
    let mut queue = VecDeque::from([root]);
    depths[root] = 0;

    while let Some(position) = queue.pop_front() {
        let depth = depths[position];
        if depth > MAX_DEPTH {
            return Err(SchemaError::TooDeep {
                id: defs[position].id.clone(),
                depth,
                max: MAX_DEPTH,
            });
        }
        for &child in &children[position] {
            depths[child] = depth + 1;
            let def = &defs[child];
            languages[child] = if position == root {
                if def.kind != NodeKind::Menu {
                    return Err(SchemaError::MisplacedKind {
                        id: def.id.clone(),
                        kind: def.kind,
                    });
                }
                Some(
                    def.language
                        .ok_or_else(|| SchemaError::MissingLanguage(def.id.clone()))?,
                )
            } else {
                if def.kind == NodeKind::Menu {
                    return Err(SchemaError::MisplacedKind {
                        id: def.id.clone(),
                        kind: def.kind,
                    });
                }
                let inherited = languages[position];
                match (def.language, inherited) {
                    (Some(declared), Some(inherited)) if declared != inherited => {
                        return Err(SchemaError::LanguageMismatch {
                            id: def.id.clone(),
                            declared,
                            inherited,
                        })
                    }
                    _ => inherited,
                }
            };
            queue.push_back(child);
        }
    }

    let unreachable: Vec<String> = depths
        .iter()
        .enumerate()
        .filter(|(_, depth)| **depth == usize::MAX)
        .map(|(position, _)| defs[position].id.clone())
        .collect();
    if !unreachable.is_empty() {
        return Err(SchemaError::Unreachable(unreachable));
    }

    Ok((depths, languages))
}
