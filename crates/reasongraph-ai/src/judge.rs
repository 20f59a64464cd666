use crate::llm_provider::{GenerationConfig, LLMProvider};
use async_trait::async_trait;
use parking_lot::Mutex;
use reasongraph_core::{LLMConfig, NodeId, NodeStore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Decides whether two nodes are functionally equivalent.
///
/// Implementations never fail: anything that prevents a confident yes is
/// a no.
#[async_trait]
pub trait SemanticJudge: Send + Sync {
    async fn judge(&self, store: &NodeStore, a: &str, b: &str) -> bool;

    fn judge_name(&self) -> &str;
}

/// Render a node for the judge prompt. With `include_children`, active
/// children are listed under a `Children:` block numbered by their position
/// in the child list. `None` for an unknown id.
pub fn describe_node(store: &NodeStore, id: &str, include_children: bool) -> Option<String> {
    let node = store.get(id)?;
    let mut text = format!(
        "Node Type: {}\nSummary: {}\nContent: {}\nDepth: {}\n",
        node.node_type, node.summary, node.content, node.depth
    );

    if include_children {
        let children: Vec<(usize, _)> = node
            .children
            .iter()
            .enumerate()
            .filter_map(|(i, child_id)| store.get(child_id).map(|child| (i + 1, child)))
            .filter(|(_, child)| child.is_active())
            .collect();

        if !children.is_empty() {
            text.push_str("\nChildren:\n");
            for (position, child) in children {
                text.push_str(&format!(
                    "  Child {} ({}):\n    Summary: {}\n    Content: {}\n",
                    position, child.node_type, child.summary, child.content
                ));
            }
        }
    }

    Some(text)
}

/// Prompt asking whether two rendered nodes are erotetically equivalent.
pub fn equivalence_prompt(node_a: &str, node_b: &str) -> String {
    format!(
        r#"You are evaluating whether two philosophical nodes are functionally equivalent in the erotetic sense. Two nodes are erotetically equivalent if their effect on a human reasoning philosophical agent would be functionally the same - meaning they would lead to the same patterns of inquiry, reasoning, and conclusions, even if they might differ in superficial presentation.

The content may include propositions marked with curly braces {{like this}}, which represent structured philosophical claims.

Consider the following two nodes from a philosophical reasoning graph, including their content and children:

NODE A:
{node_a}

NODE B:
{node_b}

Evaluate whether these two nodes represent views that are functionally equivalent in the erotetic sense. Consider:

1. Do they express the same fundamental philosophical position, argument, or conceptual distinction?
2. Would they lead a reasoning agent to the same conclusions and further inquiries?
3. Do their children (if any) support the same logical structure and reasoning path?
4. Are any differences merely presentational/linguistic rather than substantive?
5. For thesis nodes: Do they make the same core claims about the concept being analyzed?
6. For question nodes: Do they address the same philosophical issue or distinction?
7. For support nodes: Do they provide the same type of evidential or logical support?

Note that nodes can be equivalent even if they use different terminology, as long as they capture the same philosophical insight or make the same functional contribution to the reasoning process.

Respond with only "TRUE" if they are erotetically equivalent, or "FALSE" if they are not. Do not provide explanation."#
    )
}

/// Verdict from a raw model reply: only `TRUE` (after trimming, any case)
/// counts as equivalent.
pub fn parse_verdict(reply: &str) -> bool {
    reply.trim().to_uppercase() == "TRUE"
}

/// Judge that asks an LLM with the erotetic equivalence rubric.
pub struct LlmSemanticJudge {
    provider: Arc<dyn LLMProvider>,
    generation: GenerationConfig,
    include_children: bool,
}

impl LlmSemanticJudge {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            generation: GenerationConfig {
                temperature: 0.1,
                max_tokens: Some(10),
                ..Default::default()
            },
            include_children: true,
        }
    }

    /// Generation settings taken from the `[llm]` configuration section.
    pub fn from_config(provider: Arc<dyn LLMProvider>, config: &LLMConfig) -> Self {
        let mut judge = Self::new(provider);
        judge.generation.temperature = config.temperature;
        judge.generation.max_tokens = Some(config.max_tokens);
        judge
    }

    pub fn with_children(mut self, include_children: bool) -> Self {
        self.include_children = include_children;
        self
    }

    pub fn generation_config(&self) -> &GenerationConfig {
        &self.generation
    }
}

#[async_trait]
impl SemanticJudge for LlmSemanticJudge {
    async fn judge(&self, store: &NodeStore, a: &str, b: &str) -> bool {
        let (Some(node_a), Some(node_b)) = (
            describe_node(store, a, self.include_children),
            describe_node(store, b, self.include_children),
        ) else {
            warn!("Cannot judge {} / {}: node not found", a, b);
            return false;
        };

        let prompt = equivalence_prompt(&node_a, &node_b);
        match self
            .provider
            .generate_with_config(&prompt, &self.generation)
            .await
        {
            Ok(response) => {
                let reply = response.content.trim().to_uppercase();
                if reply != "TRUE" && reply != "FALSE" {
                    warn!(
                        "Unexpected reply from {} judging {} / {}: {:?}; treating as not equivalent",
                        self.provider.provider_name(),
                        a,
                        b,
                        response.content
                    );
                }
                let verdict = parse_verdict(&response.content);
                debug!("Judge verdict for {} / {}: {}", a, b, verdict);
                verdict
            }
            Err(e) => {
                error!("Error in LLM evaluation of {} / {}: {}", a, b, e);
                false
            }
        }
    }

    fn judge_name(&self) -> &str {
        self.provider.provider_name()
    }
}

/// Judge that always returns the same verdict and counts how often it was
/// asked.
#[derive(Debug)]
pub struct FixedJudge {
    verdict: bool,
    calls: AtomicUsize,
}

impl FixedJudge {
    pub fn new(verdict: bool) -> Self {
        Self {
            verdict,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn accept_all() -> Self {
        Self::new(true)
    }

    pub fn reject_all() -> Self {
        Self::new(false)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SemanticJudge for FixedJudge {
    async fn judge(&self, _store: &NodeStore, _a: &str, _b: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.verdict
    }

    fn judge_name(&self) -> &str {
        if self.verdict {
            "accept-all"
        } else {
            "reject-all"
        }
    }
}

/// Judge that accepts exactly the listed unordered pairs and records every
/// question it was asked.
#[derive(Debug, Default)]
pub struct ScriptedJudge {
    equivalent: HashSet<(NodeId, NodeId)>,
    asked: Mutex<Vec<(NodeId, NodeId)>>,
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pair(mut self, a: impl Into<NodeId>, b: impl Into<NodeId>) -> Self {
        self.equivalent.insert(ordered(a.into(), b.into()));
        self
    }

    /// Pairs asked so far, in call order, as passed in.
    pub fn asked(&self) -> Vec<(NodeId, NodeId)> {
        self.asked.lock().clone()
    }
}

#[async_trait]
impl SemanticJudge for ScriptedJudge {
    async fn judge(&self, _store: &NodeStore, a: &str, b: &str) -> bool {
        self.asked.lock().push((a.to_string(), b.to_string()));
        self.equivalent
            .contains(&ordered(a.to_string(), b.to_string()))
    }

    fn judge_name(&self) -> &str {
        "scripted"
    }
}

fn ordered(a: NodeId, b: NodeId) -> (NodeId, NodeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}
