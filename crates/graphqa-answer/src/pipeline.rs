//! The question-answering loop: retrieve, compose, infer, print.
//!
//! The pipeline is a two-state machine. It starts in
//! [`LoopState::AwaitingQuestion`] and moves to [`LoopState::Terminated`] on
//! the exit sentinel (or end of input), releasing the graph connection on the
//! way. Questions are answered one at a time; graph sessions never span the
//! inference call.

use std::collections::BTreeSet;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use graphqa_core::config::RetrievalSettings;
use graphqa_core::{Answer, Fact, Prompt};
use graphqa_graph::{GraphBackend, GraphConnection, GraphError};

use crate::error::{PipelineError, Result};
use crate::inference::Inference;
use crate::prompt::PromptComposer;

/// Case-insensitive input that ends the loop.
pub const EXIT_SENTINEL: &str = "exit";

const INPUT_PROMPT: &str = "Enter your question (type 'exit' to quit): ";

const INVALID_INPUT: &str = "Input was not valid UTF-8, please try again.\n";

/// Capitalized words that start questions rather than name things.
const QUESTION_WORDS: &[&str] = &[
    "What", "Which", "Who", "Whom", "Whose", "When", "Where", "Why", "How", "Does", "Did", "Do",
    "Is", "Are", "Was", "Were", "Can", "Could", "Should", "Would", "Will", "The", "Tell", "Please",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    AwaitingQuestion,
    Terminated,
}

/// Outcome of one line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Turn {
    Answered(String),
    /// Blank input; nothing was asked.
    Skipped,
    Exit,
}

pub struct AnswerPipeline<B: GraphBackend, I: Inference> {
    graph: GraphConnection<B>,
    inference: I,
    composer: PromptComposer,
    settings: RetrievalSettings,
    state: LoopState,
}

impl<B: GraphBackend, I: Inference> AnswerPipeline<B, I> {
    pub fn new(graph: GraphConnection<B>, inference: I, settings: RetrievalSettings) -> Self {
        let composer = PromptComposer::new(settings.grounding_field.clone())
            .with_entity_fields(settings.entity_field.clone(), "entity_type");
        Self {
            graph,
            inference,
            composer,
            settings,
            state: LoopState::AwaitingQuestion,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn graph(&self) -> &GraphConnection<B> {
        &self.graph
    }

    // ── Retrieval ────────────────────────────────────────────────

    /// Grounding facts for a question. Query errors degrade to no facts; a
    /// lost connection is returned to the caller.
    pub async fn retrieve(&self, question: &str) -> std::result::Result<Vec<Fact>, GraphError> {
        degrade(self.try_retrieve(question).await, "Retrieval failed, answering without grounding")
    }

    async fn try_retrieve(&self, question: &str) -> std::result::Result<Vec<Fact>, GraphError> {
        let label = &self.settings.grounding_label;
        if self.settings.schema_gate && !self.graph.has_label(label).await? {
            tracing::info!(%label, "Grounding label absent from graph, skipping retrieval");
            return Ok(Vec::new());
        }
        let facts = self
            .graph
            .first_by_label(label, &[self.settings.grounding_field.as_str()])
            .await?;
        tracing::debug!(question, facts = facts.len(), "Retrieved grounding facts");
        Ok(facts)
    }

    /// Entities whose name contains a keyword of the question, when an entity
    /// label is configured. Errors degrade like [`Self::retrieve`].
    pub async fn related_entities(&self, question: &str) -> std::result::Result<Vec<Fact>, GraphError> {
        let Some(label) = self.settings.entity_label.as_deref() else {
            return Ok(Vec::new());
        };
        degrade(
            self.try_related_entities(label, question).await,
            "Entity search failed, continuing without entities",
        )
    }

    async fn try_related_entities(
        &self,
        label: &str,
        question: &str,
    ) -> std::result::Result<Vec<Fact>, GraphError> {
        let keywords = extract_keywords(question, self.settings.max_keywords);
        if keywords.is_empty() {
            return Ok(Vec::new());
        }
        if self.settings.schema_gate && !self.graph.has_label(label).await? {
            return Ok(Vec::new());
        }
        let field = self.settings.entity_field.as_str();
        let hits = self
            .graph
            .search_keywords(
                label,
                field,
                &keywords,
                &[field, "entity_type"],
                self.settings.keyword_limit,
            )
            .await?;
        Ok(hits.into_iter().flat_map(|h| h.facts).collect())
    }

    // ── Answering ────────────────────────────────────────────────

    pub async fn prompt_for(&self, question: &str) -> Result<Prompt> {
        let facts = self.retrieve(question).await?;
        let entities = self.related_entities(question).await?;
        Ok(self
            .composer
            .compose_with_entities(question, &facts, &entities))
    }

    /// Retrieve, compose and infer. A lost graph connection or an inference
    /// failure is an error; query failures are not.
    pub async fn try_answer(&self, question: &str) -> Result<Answer> {
        let prompt = self.prompt_for(question).await?;
        Ok(self.inference.infer(&prompt).await?)
    }

    /// Answer text for a question; any failure of the turn becomes the text.
    pub async fn answer(&self, question: &str) -> String {
        match self.try_answer(question).await {
            Ok(answer) => answer.text,
            Err(e) => {
                tracing::error!(error = %e, "Question could not be answered");
                format!("Sorry, no answer could be produced: {e}")
            }
        }
    }

    // ── State machine ────────────────────────────────────────────

    pub async fn handle_input(&mut self, input: &str) -> Result<Turn> {
        if self.state == LoopState::Terminated {
            return Err(PipelineError::Terminated);
        }
        let input = input.trim();
        if input.eq_ignore_ascii_case(EXIT_SENTINEL) {
            self.terminate().await;
            return Ok(Turn::Exit);
        }
        if input.is_empty() {
            return Ok(Turn::Skipped);
        }
        Ok(Turn::Answered(self.answer(input).await))
    }

    /// Release the graph connection and stop accepting input.
    pub async fn terminate(&mut self) {
        if self.state == LoopState::Terminated {
            return;
        }
        self.graph.close().await;
        self.state = LoopState::Terminated;
        tracing::info!("Question loop terminated");
    }

    /// Read questions line by line until the exit sentinel or end of input.
    /// The connection is released on every exit path.
    pub async fn run<R, W>(&mut self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.drive(reader, &mut writer).await;
        self.terminate().await;
        result
    }

    async fn drive<R, W>(&mut self, mut reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        while self.state == LoopState::AwaitingQuestion {
            writer.write_all(INPUT_PROMPT.as_bytes()).await?;
            writer.flush().await?;

            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                writer.write_all(b"\n").await?;
                break;
            }
            let Ok(line) = std::str::from_utf8(&buf) else {
                tracing::warn!(bytes = buf.len(), "Skipping input line that is not valid UTF-8");
                writer.write_all(INVALID_INPUT.as_bytes()).await?;
                continue;
            };
            if let Turn::Answered(text) = self.handle_input(line).await? {
                writer.write_all(format!("Answer: {text}\n").as_bytes()).await?;
            }
        }
        writer.flush().await?;
        Ok(())
    }
}

/// Swallow query errors into an empty result; connection errors pass through.
fn degrade(
    result: std::result::Result<Vec<Fact>, GraphError>,
    message: &str,
) -> std::result::Result<Vec<Fact>, GraphError> {
    match result {
        Err(e) if !e.is_connection() => {
            tracing::warn!(error = %e, "{}", message);
            Ok(Vec::new())
        }
        other => other,
    }
}

/// Capitalized words of at least three characters, in order of first
/// appearance, skipping question words.
pub fn extract_keywords(question: &str, max: usize) -> Vec<String> {
    let mut seen = BTreeSet::new();
    question
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3)
        .filter(|t| t.chars().next().is_some_and(char::is_uppercase))
        .filter(|t| !QUESTION_WORDS.contains(t))
        .filter(|t| seen.insert(t.to_string()))
        .take(max)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use graphqa_graph::MemoryGraph;

    use crate::inference::InferenceError;
    use crate::prompt::NO_GROUNDING_PLACEHOLDER;

    /// Echoes the grounding line of the prompt back as the answer.
    #[derive(Clone, Default)]
    struct EchoInference {
        prompts: Arc<Mutex<Vec<String>>>,
        calls: Arc<AtomicUsize>,
    }

    impl EchoInference {
        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Inference for EchoInference {
        async fn infer(&self, prompt: &Prompt) -> std::result::Result<Answer, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.as_str().to_string());
            let grounding = prompt
                .as_str()
                .lines()
                .find_map(|l| l.strip_prefix("Relevant policy information: "))
                .unwrap_or_default()
                .to_string();
            Ok(Answer {
                text: format!("Echo: {grounding}"),
                model: "echo".to_string(),
            })
        }
    }

    struct FailingInference;

    #[async_trait]
    impl Inference for FailingInference {
        async fn infer(&self, _prompt: &Prompt) -> std::result::Result<Answer, InferenceError> {
            Err(InferenceError::Malformed("missing message.content".to_string()))
        }
    }

    fn pipeline_with<I: Inference>(graph: &MemoryGraph, inference: I) -> AnswerPipeline<MemoryGraph, I> {
        AnswerPipeline::new(
            GraphConnection::new(graph.clone()),
            inference,
            RetrievalSettings::default(),
        )
    }

    fn policy_graph() -> MemoryGraph {
        let graph = MemoryGraph::new();
        graph.add_node(&["Policy"], [("content", "Policy X requires annual filing")]);
        graph
    }

    #[tokio::test]
    async fn grounded_answer_uses_policy_content() {
        let graph = policy_graph();
        let echo = EchoInference::default();
        let pipeline = pipeline_with(&graph, echo.clone());

        let answer = pipeline.answer("What does Policy X require?").await;

        assert!(echo.last_prompt().contains("Policy X requires annual filing"));
        assert!(echo.last_prompt().contains("What does Policy X require?"));
        assert_eq!(answer, "Echo: Policy X requires annual filing");
        assert_eq!(graph.sessions_opened(), graph.sessions_closed());
    }

    #[tokio::test]
    async fn empty_graph_answers_with_placeholder() {
        let graph = MemoryGraph::new();
        let echo = EchoInference::default();
        let pipeline = pipeline_with(&graph, echo.clone());

        let answer = pipeline.try_answer("What does Policy X require?").await.unwrap();

        assert!(echo.last_prompt().contains(NO_GROUNDING_PLACEHOLDER));
        assert_eq!(answer.text, format!("Echo: {NO_GROUNDING_PLACEHOLDER}"));
    }

    #[tokio::test]
    async fn schema_gate_skips_retrieval_for_absent_label() {
        let graph = MemoryGraph::new();
        graph.add_node(&["HotpotEntity"], [("name", "Ed Wood")]);
        let pipeline = pipeline_with(&graph, EchoInference::default());

        assert!(pipeline.retrieve("anything").await.unwrap().is_empty());
        // Only the label catalog was read.
        assert_eq!(graph.sessions_opened(), 1);
    }

    #[tokio::test]
    async fn query_failure_degrades_to_placeholder() {
        let graph = policy_graph();
        graph.fail_queries(true);
        let echo = EchoInference::default();
        let mut pipeline = pipeline_with(&graph, echo.clone());

        let turn = pipeline.handle_input("What does Policy X require?").await.unwrap();

        assert_eq!(turn, Turn::Answered(format!("Echo: {NO_GROUNDING_PLACEHOLDER}")));
        assert_eq!(pipeline.state(), LoopState::AwaitingQuestion);
        assert_eq!(graph.sessions_opened(), graph.sessions_closed());
    }

    #[tokio::test]
    async fn lost_connection_is_reported_in_the_turn() {
        let graph = policy_graph();
        graph.refuse_sessions(true);
        let echo = EchoInference::default();
        let mut pipeline = pipeline_with(&graph, echo.clone());

        let Turn::Answered(text) = pipeline.handle_input("What does Policy X require?").await.unwrap() else {
            panic!("expected an answer turn");
        };
        assert!(text.starts_with("Sorry, no answer could be produced"));
        assert!(text.contains("connection refused"));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.state(), LoopState::AwaitingQuestion);
        assert!(matches!(
            pipeline.try_answer("Q?").await,
            Err(PipelineError::Graph(e)) if e.is_connection()
        ));

        graph.refuse_sessions(false);
        let turn = pipeline.handle_input("What does Policy X require?").await.unwrap();
        assert_eq!(turn, Turn::Answered("Echo: Policy X requires annual filing".to_string()));
    }

    #[tokio::test]
    async fn inference_failure_becomes_answer_text() {
        let graph = policy_graph();
        let mut pipeline = pipeline_with(&graph, FailingInference);

        let Turn::Answered(text) = pipeline.handle_input("Q?").await.unwrap() else {
            panic!("expected an answer turn");
        };
        assert!(text.starts_with("Sorry, no answer could be produced"));
        assert!(text.contains("missing message.content"));
        assert_eq!(pipeline.state(), LoopState::AwaitingQuestion);
        assert!(matches!(
            pipeline.try_answer("Q?").await,
            Err(PipelineError::Inference(_))
        ));
    }

    #[tokio::test]
    async fn exit_sentinel_terminates_and_closes_once() {
        for sentinel in ["exit", "EXIT", "  Exit  "] {
            let graph = policy_graph();
            let mut pipeline = pipeline_with(&graph, EchoInference::default());

            assert_eq!(pipeline.handle_input(sentinel).await.unwrap(), Turn::Exit);
            assert_eq!(pipeline.state(), LoopState::Terminated);
            assert!(pipeline.graph().is_closed());

            pipeline.terminate().await;
            assert!(matches!(
                pipeline.handle_input("more?").await,
                Err(PipelineError::Terminated)
            ));
            assert_eq!(graph.shutdowns(), 1);
        }
    }

    #[tokio::test]
    async fn blank_input_is_skipped_without_inference() {
        let graph = policy_graph();
        let echo = EchoInference::default();
        let mut pipeline = pipeline_with(&graph, echo.clone());

        assert_eq!(pipeline.handle_input("   ").await.unwrap(), Turn::Skipped);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_answers_until_exit() {
        let graph = policy_graph();
        let echo = EchoInference::default();
        let mut pipeline = pipeline_with(&graph, echo.clone());

        let input: &[u8] = b"What does Policy X require?\n\nExIt\nnever asked\n";
        let mut output = Vec::new();
        pipeline.run(input, &mut output).await.unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains("Answer: Echo: Policy X requires annual filing\n"));
        assert_eq!(output.matches("Answer:").count(), 1);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
        assert_eq!(pipeline.state(), LoopState::Terminated);
        assert_eq!(graph.shutdowns(), 1);
    }

    #[tokio::test]
    async fn invalid_utf8_line_is_skipped() {
        let graph = policy_graph();
        let echo = EchoInference::default();
        let mut pipeline = pipeline_with(&graph, echo.clone());

        let input: &[u8] = b"\xff\xfe broken\nWhat does Policy X require?\nexit\n";
        let mut output = Vec::new();
        pipeline.run(input, &mut output).await.unwrap();

        let output = String::from_utf8(output).unwrap();
        assert!(output.contains(INVALID_INPUT));
        assert!(output.contains("Answer: Echo: Policy X requires annual filing\n"));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 1);
        assert_eq!(graph.shutdowns(), 1);
    }

    #[tokio::test]
    async fn end_of_input_also_closes_connection() {
        let graph = policy_graph();
        let mut pipeline = pipeline_with(&graph, EchoInference::default());

        let input: &[u8] = b"What does Policy X require?\n";
        let mut output = Vec::new();
        pipeline.run(input, &mut output).await.unwrap();

        assert_eq!(pipeline.state(), LoopState::Terminated);
        assert_eq!(graph.shutdowns(), 1);
    }

    #[tokio::test]
    async fn entity_enrichment_adds_related_entities() {
        let graph = policy_graph();
        graph.add_node(&["HotpotEntity"], [("name", "Scott Derrickson"), ("entity_type", "PERSON")]);
        graph.add_node(&["HotpotEntity"], [("name", "Ed Wood"), ("entity_type", "PERSON")]);
        let echo = EchoInference::default();
        let settings = RetrievalSettings {
            entity_label: Some("HotpotEntity".to_string()),
            ..RetrievalSettings::default()
        };
        let pipeline = AnswerPipeline::new(GraphConnection::new(graph.clone()), echo.clone(), settings);

        pipeline
            .answer("Were Scott Derrickson and Ed Wood of the same nationality?")
            .await;

        assert!(echo
            .last_prompt()
            .contains("Related entities: Scott Derrickson (PERSON); Ed Wood (PERSON)"));
    }

    #[test]
    fn keywords_skip_question_words_and_duplicates() {
        assert_eq!(
            extract_keywords("Were Scott Derrickson and Ed Wood of the same nationality?", 6),
            vec!["Scott", "Derrickson", "Wood"]
        );
        assert_eq!(
            extract_keywords("What does Policy X require under Policy rules?", 6),
            vec!["Policy"]
        );
        assert_eq!(extract_keywords("Alpha Beta Gamma Delta", 2), vec!["Alpha", "Beta"]);
        assert!(extract_keywords("no capitals here", 6).is_empty());
    }
}
