//! Parser for the training framework's native tree dumps
//!
//! Two dump forms are understood:
//!
//! - text, one node per line:
//!   `0:[f3<1.5] yes=1,no=2,missing=1` / `\t1:leaf=-0.25`
//!   (leading tabs give the depth; extra `gain=`/`cover=` tokens are ignored)
//! - nested objects: `{"nodeid":0,"depth":0,"split":"f3","split_condition":1.5,
//!   "yes":1,"no":2,"missing":1,"children":[...]}` / `{"nodeid":1,"leaf":-0.25}`
//!
//! Both are flattened into an id -> node list and assembled into a validated
//! [`Tree`]; a dangling or duplicate id is a `MalformedDump` error.

use crate::errors::{EnsembleError, Result};
use crate::features::FeatureContract;
use crate::gbdt::{Node, Tree};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use tracing::debug;

const NUMBER: &str = r"[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?";

static NODE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+):(.*)$").expect("node line pattern"));
static LEAF: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"leaf=({NUMBER})(?:,|\s|$)")).expect("leaf pattern"));
static SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\[([^<\]]+)<({NUMBER})\]")).expect("split pattern"));
static BRANCHES: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"yes=(\d+),no=(\d+),missing=(\d+)").expect("branch pattern")
});
static BOOSTER_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^booster\[\d+\]:[ \t]*$").expect("booster header pattern"));

/// Native dump encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpFormat {
    Text,
    Json,
}

/// Parse one tree from its text dump
pub fn parse_text_dump(text: &str, contract: &FeatureContract) -> Result<Tree> {
    let mut nodes = Vec::new();
    let mut seen = HashSet::new();

    for (line_no, raw) in text.lines().enumerate() {
        let untabbed = raw.trim_start_matches('\t');
        let indent = (raw.len() - untabbed.len()) as u32;
        let line = untabbed.trim();

        let Some(caps) = NODE_LINE.captures(line) else {
            continue;
        };
        let id = parse_id(&caps[1], line_no)?;
        let rest = &caps[2];

        if !seen.insert(id) {
            return Err(malformed(format!("line {}: duplicate node id {id}", line_no + 1)));
        }

        let node = if let Some(leaf) = LEAF.captures(rest) {
            Node::leaf(id, parse_number(&leaf[1], "leaf", line_no)?)
        } else {
            let split = SPLIT.captures(rest);
            let branches = BRANCHES.captures(rest);
            let (Some(split), Some(branches)) = (split, branches) else {
                return Err(malformed(format!(
                    "line {}: node {id} is neither a leaf nor a split: {line}",
                    line_no + 1
                )));
            };

            let feature = resolve_feature(&split[1], contract)
                .map_err(|e| malformed(format!("line {}: {e}", line_no + 1)))?;
            let node = Node::split(
                id,
                feature,
                parse_number(&split[2], "threshold", line_no)?,
                parse_id(&branches[1], line_no)?,
                parse_id(&branches[2], line_no)?,
                parse_id(&branches[3], line_no)?,
            );
            debug!(node = id, indent, "parsed split");
            node
        };
        nodes.push(node);
    }

    assemble(nodes)
}

/// Parse one tree from its nested-object dump
pub fn parse_json_dump(root: &Value, contract: &FeatureContract) -> Result<Tree> {
    let mut nodes = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![root];

    while let Some(object) = stack.pop() {
        let id = json_id(object, "nodeid")?;
        if !seen.insert(id) {
            return Err(malformed(format!("duplicate node id {id}")));
        }

        if let Some(leaf) = object.get("leaf") {
            let value = leaf
                .as_f64()
                .ok_or_else(|| malformed(format!("node {id}: leaf is not a number: {leaf}")))?;
            nodes.push(Node::leaf(id, value));
            continue;
        }

        let split = object
            .get("split")
            .ok_or_else(|| malformed(format!("node {id}: missing `split`")))?;
        let feature = match split {
            Value::String(token) => resolve_feature(token, contract),
            Value::Number(n) => n
                .as_u64()
                .map(|index| index as usize)
                .filter(|&index| index < contract.len())
                .ok_or_else(|| format!("feature index {n} out of range")),
            other => Err(format!("unsupported split feature {other}")),
        }
        .map_err(|e| malformed(format!("node {id}: {e}")))?;

        let threshold = object
            .get("split_condition")
            .and_then(Value::as_f64)
            .ok_or_else(|| malformed(format!("node {id}: missing numeric `split_condition`")))?;
        let yes = json_id(object, "yes")?;
        let no = json_id(object, "no")?;
        let missing = json_id(object, "missing")?;

        let children = object
            .get("children")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let mut child_ids = Vec::with_capacity(children.len());
        for child in children {
            child_ids.push(json_id(child, "nodeid")?);
        }
        child_ids.sort_unstable();
        let mut expected = [yes, no];
        expected.sort_unstable();
        if child_ids != expected {
            return Err(malformed(format!(
                "node {id}: children {child_ids:?} do not match yes={yes}, no={no}"
            )));
        }

        nodes.push(Node::split(id, feature, threshold, yes, no, missing));
        stack.extend(children.iter().rev());
    }

    assemble(nodes)
}

/// Parse every tree of a booster dump, one dump string per tree
pub fn parse_dumps<S: AsRef<str>>(
    dumps: &[S],
    format: DumpFormat,
    contract: &FeatureContract,
) -> Result<Vec<Tree>> {
    dumps
        .iter()
        .enumerate()
        .map(|(t_idx, dump)| {
            let tree = match format {
                DumpFormat::Text => parse_text_dump(dump.as_ref(), contract),
                DumpFormat::Json => serde_json::from_str::<Value>(dump.as_ref())
                    .map_err(|e| malformed(format!("invalid JSON: {e}")))
                    .and_then(|value| parse_json_dump(&value, contract)),
            };
            tree.map_err(|e| with_tree_index(e, t_idx))
        })
        .collect()
}

/// Parse a whole dump file.
///
/// Text files may hold several trees separated by `booster[N]:` headers (the
/// framework's `dump_model` layout) or a single tree without headers. JSON
/// files hold either an array of tree objects or a single tree object.
pub fn parse_dump_file(contents: &str, format: DumpFormat, contract: &FeatureContract) -> Result<Vec<Tree>> {
    let trees = match format {
        DumpFormat::Text => {
            let sections: Vec<&str> = BOOSTER_HEADER
                .split(contents)
                .filter(|section| !section.trim().is_empty())
                .collect();
            parse_dumps(&sections, DumpFormat::Text, contract)?
        }
        DumpFormat::Json => {
            let value: Value = serde_json::from_str(contents)
                .map_err(|e| malformed(format!("invalid JSON: {e}")))?;
            match value {
                Value::Array(items) => items
                    .iter()
                    .enumerate()
                    .map(|(t_idx, item)| {
                        parse_json_dump(item, contract).map_err(|e| with_tree_index(e, t_idx))
                    })
                    .collect::<Result<Vec<_>>>()?,
                single => vec![parse_json_dump(&single, contract)?],
            }
        }
    };

    if trees.is_empty() {
        return Err(malformed("dump contains no trees".to_string()));
    }
    debug!(trees = trees.len(), "parsed dump file");
    Ok(trees)
}

fn assemble(nodes: Vec<Node>) -> Result<Tree> {
    Tree::from_nodes(nodes).map_err(malformed)
}

fn resolve_feature(token: &str, contract: &FeatureContract) -> std::result::Result<usize, String> {
    contract
        .resolve(token)
        .ok_or_else(|| format!("unknown feature `{token}`"))
}

fn parse_id(raw: &str, line_no: usize) -> Result<u32> {
    raw.parse()
        .map_err(|_| malformed(format!("line {}: invalid node id {raw}", line_no + 1)))
}

fn parse_number(raw: &str, what: &str, line_no: usize) -> Result<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| malformed(format!("line {}: invalid {what} {raw}", line_no + 1)))
}

fn json_id(object: &Value, key: &str) -> Result<u32> {
    let raw = object
        .get(key)
        .ok_or_else(|| malformed(format!("node object missing `{key}`: {object}")))?;
    raw.as_u64()
        .and_then(|id| u32::try_from(id).ok())
        .ok_or_else(|| malformed(format!("`{key}` is not a node id: {raw}")))
}

fn malformed(message: String) -> EnsembleError {
    EnsembleError::MalformedDump(message)
}

fn with_tree_index(err: EnsembleError, t_idx: usize) -> EnsembleError {
    match err {
        EnsembleError::MalformedDump(message) => {
            EnsembleError::MalformedDump(format!("tree {t_idx}: {message}"))
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Sample;
    use serde_json::json;

    fn contract() -> FeatureContract {
        FeatureContract::new(vec!["pxi_score".into(), "vix".into(), "cat_credit".into()]).unwrap()
    }

    #[test]
    fn test_single_leaf_dump() {
        let tree = parse_text_dump("0:leaf=1.5", &contract()).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree.root(), &Node::leaf(0, 1.5));
    }

    #[test]
    fn test_split_dump() {
        let dump = "0:[f0<10] yes=1,no=2,missing=1\n\t1:leaf=-3.0\n\t2:leaf=4.0\n";
        let tree = parse_text_dump(dump, &contract()).unwrap();

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.root(), &Node::split(0, 0, 10.0, 1, 2, 1));
        assert_eq!(tree.evaluate(&Sample::from_dense(&[5.0, 0.0, 0.0])), Ok(-3.0));
        assert_eq!(tree.evaluate(&Sample::from_dense(&[15.0, 0.0, 0.0])), Ok(4.0));
        assert_eq!(tree.evaluate(&Sample::missing(3)), Ok(-3.0));
    }

    #[test]
    fn test_framework_dump_with_stats() {
        let dump = "\
0:[f1<22.5] yes=1,no=2,missing=2,gain=105.2,cover=480
\t1:[cat_credit<4.5e+01] yes=3,no=4,missing=3,gain=12,cover=300
\t\t3:leaf=-1.2e-02,cover=120
\t\t4:leaf=0.034,cover=180
\t2:leaf=-0.5,cover=180
";
        let tree = parse_text_dump(dump, &contract()).unwrap();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.depth(), 2);
        match tree.node(1) {
            Some(Node::Split {
                feature, threshold, depth, ..
            }) => {
                assert_eq!(*feature, 2);
                assert_eq!(*threshold, 45.0);
                assert_eq!(*depth, 1);
            }
            other => panic!("unexpected node {other:?}"),
        }
        assert_eq!(tree.node(3).and_then(Node::leaf_value), Some(-0.012));
    }

    #[test]
    fn test_malformed_text_dumps() {
        let contract = contract();

        // dangling reference
        let err = parse_text_dump("0:[f0<1] yes=1,no=2,missing=1\n1:leaf=1", &contract).unwrap_err();
        assert!(matches!(err, EnsembleError::MalformedDump(_)));
        assert!(err.to_string().contains("dangling"), "{err}");

        // duplicate ids
        let err = parse_text_dump("0:leaf=1\n0:leaf=2", &contract).unwrap_err();
        assert!(err.to_string().contains("duplicate"), "{err}");

        // unknown feature
        let err = parse_text_dump(
            "0:[spy<1] yes=1,no=2,missing=1\n1:leaf=1\n2:leaf=2",
            &contract,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown feature"), "{err}");

        // positional token out of range
        assert!(parse_text_dump(
            "0:[f9<1] yes=1,no=2,missing=1\n1:leaf=1\n2:leaf=2",
            &contract,
        )
        .is_err());

        // neither leaf nor split
        assert!(parse_text_dump("0:[f0:{1,2}] yes=1,no=2", &contract).is_err());

        // trailing garbage after a leaf value
        let err = parse_text_dump("0:leaf=1.5abc", &contract).unwrap_err();
        assert!(matches!(err, EnsembleError::MalformedDump(_)), "{err}");
        assert!(parse_text_dump("0:leaf=1.5.2", &contract).is_err());

        // no nodes at all
        assert!(parse_text_dump("\n\n", &contract).is_err());
    }

    #[test]
    fn test_any_threshold_is_accepted() {
        // child threshold need not be consistent with its ancestor
        let dump = "0:[f0<10] yes=1,no=2,missing=1\n1:[f0<20] yes=3,no=4,missing=3\n2:leaf=0\n3:leaf=1\n4:leaf=2";
        let tree = parse_text_dump(dump, &contract()).unwrap();
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn test_json_dump() {
        let value = json!({
            "nodeid": 0, "depth": 0, "split": "vix", "split_condition": 20.0,
            "yes": 1, "no": 2, "missing": 2,
            "children": [
                {"nodeid": 1, "leaf": 0.25},
                {"nodeid": 2, "leaf": -0.75}
            ]
        });
        let tree = parse_json_dump(&value, &contract()).unwrap();
        assert_eq!(tree.root(), &Node::split(0, 1, 20.0, 1, 2, 2));
        assert_eq!(tree.evaluate(&Sample::from_dense(&[0.0, 19.0, 0.0])), Ok(0.25));
        assert_eq!(tree.evaluate(&Sample::missing(3)), Ok(-0.75));
    }

    #[test]
    fn test_json_dump_children_must_match_branches() {
        let value = json!({
            "nodeid": 0, "split": "f0", "split_condition": 1.0,
            "yes": 1, "no": 2, "missing": 1,
            "children": [{"nodeid": 1, "leaf": 0.0}, {"nodeid": 3, "leaf": 0.0}]
        });
        let err = parse_json_dump(&value, &contract()).unwrap_err();
        assert!(err.to_string().contains("do not match"), "{err}");

        let value = json!({
            "nodeid": 0, "split": "f0", "split_condition": 1.0,
            "yes": 1, "no": 2, "missing": 1
        });
        assert!(parse_json_dump(&value, &contract()).is_err());

        let value = json!({"nodeid": 0, "leaf": "big"});
        assert!(parse_json_dump(&value, &contract()).is_err());
    }

    #[test]
    fn test_booster_dump_file() {
        let contents = "booster[0]:\n0:leaf=0.5\nbooster[1]:\n0:[f0<1] yes=1,no=2,missing=1\n\t1:leaf=1\n\t2:leaf=2\n";
        let trees = parse_dump_file(contents, DumpFormat::Text, &contract()).unwrap();
        assert_eq!(trees.len(), 2);
        assert_eq!(trees[0], Tree::stump(0.5));

        let single = parse_dump_file("0:leaf=0.5\n", DumpFormat::Text, &contract()).unwrap();
        assert_eq!(single.len(), 1);

        let json = r#"[{"nodeid":0,"leaf":0.5},{"nodeid":0,"leaf":-0.5}]"#;
        let trees = parse_dump_file(json, DumpFormat::Json, &contract()).unwrap();
        assert_eq!(trees.len(), 2);
    }

    #[test]
    fn test_tree_index_in_errors() {
        let dumps = ["0:leaf=1", "0:[f0<1] yes=1,no=2,missing=1"];
        let err = parse_dumps(&dumps, DumpFormat::Text, &contract()).unwrap_err();
        assert!(err.to_string().contains("tree 1"), "{err}");
    }
}
