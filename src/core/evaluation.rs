//! 以 LLM 評審比對回覆與標準答案的離線評測

use crate::core::orchestrator::TriageEngine;
use crate::core::retry::RetryPolicy;
use crate::domain::model::{CompletionPurpose, CompletionRequest};
use crate::domain::ports::CompletionClient;
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

pub const JUDGE_INSTRUCTIONS: &str = "You are an expert evaluator for a medical guidance assistant that helps patients with total joint replacement recovery.

Compare the agent's response to the expected response for semantic equivalence. The responses don't need to match word-for-word, but should convey the same medical guidance and key information.

Consider a response CORRECT if it:
1. Provides the same core medical advice or information
2. Mentions the same key steps, timeframes, or precautions
3. Maintains the same level of care and safety (e.g., \"call your doctor\" conditions)

Consider a response INCORRECT if it:
1. Provides contradictory medical advice
2. Omits critical safety information
3. Gives significantly different guidance
4. Is an error message or refuses to help when it should answer

Respond with ONLY 'PASS' or 'FAIL' followed by a brief explanation.";

/// 資料集的一列：`input,expected_output`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EvalCase {
    pub input: String,
    pub expected_output: String,
}

pub fn load_cases<P: AsRef<Path>>(path: P) -> Result<Vec<EvalCase>> {
    let reader = csv::Reader::from_path(path)?;
    collect_cases(reader)
}

pub fn load_cases_from_reader<R: Read>(reader: R) -> Result<Vec<EvalCase>> {
    collect_cases(csv::Reader::from_reader(reader))
}

fn collect_cases<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<EvalCase>> {
    let mut cases = Vec::new();
    for record in reader.deserialize() {
        cases.push(record?);
    }
    Ok(cases)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub explanation: String,
}

/// 解析評審回覆；開頭不是 PASS/FAIL 時退而搜尋整段文字，兩者都沒有視為未通過
pub fn parse_verdict(raw: &str) -> Verdict {
    let text = raw.trim();
    let head = text.trim_start_matches(|c: char| !c.is_ascii_alphanumeric());
    let upper = head.to_ascii_uppercase();

    let rest = |verdict: &str| {
        head[verdict.len()..]
            .trim_start_matches(|c: char| !c.is_ascii_alphanumeric())
            .trim()
            .to_string()
    };

    if upper.starts_with("PASS") {
        return Verdict {
            passed: true,
            explanation: rest("PASS"),
        };
    }
    if upper.starts_with("FAIL") {
        return Verdict {
            passed: false,
            explanation: rest("FAIL"),
        };
    }

    let whole = text.to_ascii_uppercase();
    Verdict {
        passed: whole.contains("PASS") && !whole.contains("FAIL"),
        explanation: text.to_string(),
    }
}

pub struct Judge<C: CompletionClient> {
    client: Arc<C>,
    retry: RetryPolicy,
}

impl<C: CompletionClient> Judge<C> {
    pub fn new(client: Arc<C>, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    pub async fn judge(&self, case: &EvalCase, response: &str) -> Result<Verdict> {
        let request = CompletionRequest {
            purpose: CompletionPurpose::Answer,
            system_prompt: JUDGE_INSTRUCTIONS.to_string(),
            user_text: format!(
                "User Question: {}\n\nExpected Response: {}\n\nAgent Response: {}",
                case.input, case.expected_output, response
            ),
            response_schema: None,
        };

        let raw = self
            .retry
            .run("judge", || self.client.complete(&request))
            .await?;
        Ok(parse_verdict(&raw))
    }
}

/// 產生待評回覆的一方：程序內的引擎或遠端 /ask
#[async_trait]
pub trait Respondent: Send + Sync {
    async fn respond(&self, input: &str) -> Result<String>;
}

#[async_trait]
impl<C: CompletionClient> Respondent for TriageEngine<C> {
    async fn respond(&self, input: &str) -> Result<String> {
        Ok(self.process(input).await?.text)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalResult {
    pub item_number: usize,
    pub input: String,
    pub expected_output: String,
    pub agent_response: String,
    pub pass: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvalSummary {
    pub timestamp: DateTime<Utc>,
    pub dataset_path: String,
    pub total_items: usize,
    pub passed: usize,
    pub failed: usize,
    /// 百分比，小數兩位
    pub pass_rate: f64,
    pub results: Vec<EvalResult>,
}

impl EvalSummary {
    pub fn from_results(dataset_path: impl Into<String>, results: Vec<EvalResult>) -> Self {
        let total_items = results.len();
        let passed = results.iter().filter(|r| r.pass).count();

        Self {
            timestamp: Utc::now(),
            dataset_path: dataset_path.into(),
            total_items,
            passed,
            failed: total_items - passed,
            pass_rate: pass_rate(passed, total_items),
            results,
        }
    }

    pub fn failures(&self) -> impl Iterator<Item = &EvalResult> {
        self.results.iter().filter(|r| !r.pass)
    }
}

pub fn pass_rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let percent = passed as f64 / total as f64 * 100.0;
    (percent * 100.0).round() / 100.0
}

pub struct Evaluator<C: CompletionClient> {
    respondent: Arc<dyn Respondent>,
    judge: Judge<C>,
}

impl<C: CompletionClient> Evaluator<C> {
    pub fn new(respondent: Arc<dyn Respondent>, judge: Judge<C>) -> Self {
        Self { respondent, judge }
    }

    /// 依序評測；單題失敗記為未通過，不中斷整批
    pub async fn run(&self, dataset_path: &str, cases: &[EvalCase]) -> EvalSummary {
        let mut results = Vec::with_capacity(cases.len());

        for (index, case) in cases.iter().enumerate() {
            let item_number = index + 1;
            let (agent_response, verdict) = match self.respondent.respond(&case.input).await {
                Ok(response) => {
                    let verdict = match self.judge.judge(case, &response).await {
                        Ok(verdict) => verdict,
                        Err(e) => Verdict {
                            passed: false,
                            explanation: format!("Error: {}", e),
                        },
                    };
                    (response, verdict)
                }
                Err(e) => {
                    let message = format!("Error: {}", e);
                    (
                        message.clone(),
                        Verdict {
                            passed: false,
                            explanation: message,
                        },
                    )
                }
            };

            tracing::info!(
                "{} Item {}/{}: {}",
                if verdict.passed { "✅" } else { "❌" },
                item_number,
                cases.len(),
                if verdict.passed { "PASS" } else { "FAIL" }
            );

            results.push(EvalResult {
                item_number,
                input: case.input.clone(),
                expected_output: case.expected_output.clone(),
                agent_response,
                pass: verdict.passed,
                explanation: verdict.explanation,
            });
        }

        EvalSummary::from_results(dataset_path, results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::TriageError;
    use std::sync::Mutex;
    use std::time::Duration;

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    /// Judge stub that replies from a queue and remembers each prompt.
    struct QueuedJudge {
        replies: Mutex<Vec<String>>,
        prompts: Mutex<Vec<String>>,
    }

    impl QueuedJudge {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|r| r.to_string()).collect()),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionClient for QueuedJudge {
        async fn complete(&self, request: &CompletionRequest) -> Result<String> {
            self.prompts.lock().unwrap().push(request.user_text.clone());
            self.replies
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| TriageError::UpstreamStatus {
                    status: 400,
                    body: "no reply queued".to_string(),
                })
        }
    }

    struct EchoRespondent;

    #[async_trait]
    impl Respondent for EchoRespondent {
        async fn respond(&self, input: &str) -> Result<String> {
            if input.contains("offline") {
                return Err(TriageError::Timeout { millis: 100 });
            }
            Ok(format!("answer to {}", input))
        }
    }

    fn case(input: &str) -> EvalCase {
        EvalCase {
            input: input.to_string(),
            expected_output: format!("expected {}", input),
        }
    }

    #[test]
    fn test_parse_verdict_prefixes() {
        assert_eq!(
            parse_verdict("PASS - covers the same precautions"),
            Verdict {
                passed: true,
                explanation: "covers the same precautions".to_string()
            }
        );
        assert_eq!(
            parse_verdict("  fail: omits when to call 911\n"),
            Verdict {
                passed: false,
                explanation: "omits when to call 911".to_string()
            }
        );
        assert!(parse_verdict("**PASS**\nSame guidance.").passed);
    }

    #[test]
    fn test_parse_verdict_without_prefix() {
        assert!(parse_verdict("The answer matches, so PASS.").passed);
        assert!(!parse_verdict("Hard to say; not PASS, more of a FAIL").passed);
        assert!(!parse_verdict("I cannot evaluate this").passed);
        assert!(!parse_verdict("").passed);
    }

    #[test]
    fn test_pass_rate_is_rounded_percentage() {
        assert_eq!(pass_rate(0, 0), 0.0);
        assert_eq!(pass_rate(3, 3), 100.0);
        assert_eq!(pass_rate(1, 3), 33.33);
        assert_eq!(pass_rate(2, 3), 66.67);
    }

    #[test]
    fn test_cases_load_from_csv() {
        let data = "input,expected_output\n\"What is ERAS?\",\"A program, for faster recovery\"\nhello,Hi there\n";
        let cases = load_cases_from_reader(data.as_bytes()).unwrap();

        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].expected_output, "A program, for faster recovery");
        assert_eq!(cases[1], EvalCase {
            input: "hello".to_string(),
            expected_output: "Hi there".to_string()
        });
    }

    #[test]
    fn test_csv_without_expected_column_is_rejected() {
        let result = load_cases_from_reader("question\nWhat is ERAS?\n".as_bytes());
        assert!(matches!(result, Err(TriageError::CsvError(_))));
    }

    #[tokio::test]
    async fn test_judge_sees_question_expectation_and_answer() {
        let client = QueuedJudge::new(&["PASS same meaning"]);
        let judge = Judge::new(Arc::clone(&client), fast_retry());

        let verdict = judge.judge(&case("What is ERAS?"), "ERAS helps you heal").await.unwrap();

        assert!(verdict.passed);
        let prompt = client.prompts.lock().unwrap()[0].clone();
        assert!(prompt.contains("User Question: What is ERAS?"));
        assert!(prompt.contains("Expected Response: expected What is ERAS?"));
        assert!(prompt.contains("Agent Response: ERAS helps you heal"));
    }

    #[tokio::test]
    async fn test_evaluation_summary_counts_passes_and_errors() {
        // the offline case never reaches the judge, so only three replies are queued
        let client = QueuedJudge::new(&["PASS", "FAIL wrong timeframe", "PASS"]);
        let evaluator = Evaluator::new(Arc::new(EchoRespondent), Judge::new(client, fast_retry()));
        let cases = [case("q1"), case("q2"), case("offline q3"), case("q4")];

        let summary = evaluator.run("dataset.csv", &cases).await;

        assert_eq!(summary.total_items, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.pass_rate, 50.0);
        assert_eq!(summary.results[0].agent_response, "answer to q1");
        assert_eq!(summary.results[1].explanation, "wrong timeframe");
        assert!(summary.results[2].agent_response.starts_with("Error:"));

        let failed: Vec<usize> = summary.failures().map(|r| r.item_number).collect();
        assert_eq!(failed, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_judge_outage_counts_as_failure() {
        let client = QueuedJudge::new(&[]);
        let evaluator = Evaluator::new(Arc::new(EchoRespondent), Judge::new(client, fast_retry()));

        let summary = evaluator.run("dataset.csv", &[case("q1")]).await;

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.pass_rate, 0.0);
        assert!(summary.results[0].explanation.starts_with("Error:"));
    }

    #[test]
    fn test_summary_serializes_for_report() {
        let summary = EvalSummary::from_results("dataset.csv", Vec::new());
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["total_items"], 0);
        assert_eq!(json["pass_rate"], 0.0);
        assert!(json["results"].as_array().unwrap().is_empty());
    }
}
