use crate::domain::model::{Category, Classification, HandlerKind, RoutingDecision, RoutingMode};

/// 分類 → 處理器的固定對照表；UNKNOWN 一律走免責聲明
pub fn route(classification: &Classification) -> RoutingDecision {
    let selected_handler = match classification.category {
        Category::Emergency => HandlerKind::Emergency,
        Category::AdviceRequest => HandlerKind::AdviceDisclaimer,
        Category::DomainInfo => HandlerKind::DomainInfo,
        Category::Greeting => HandlerKind::Greeting,
        Category::Unknown => HandlerKind::AdviceDisclaimer,
    };

    RoutingDecision {
        category: classification.category,
        selected_handler,
    }
}

/// 直連模式：除緊急狀況外都交給 Domain-Info
pub fn route_direct(classification: &Classification) -> RoutingDecision {
    let selected_handler = match classification.category {
        Category::Emergency => HandlerKind::Emergency,
        _ => HandlerKind::DomainInfo,
    };

    RoutingDecision {
        category: classification.category,
        selected_handler,
    }
}

pub fn route_for_mode(mode: RoutingMode, classification: &Classification) -> RoutingDecision {
    match mode {
        RoutingMode::Triage => route(classification),
        RoutingMode::Direct => route_direct(classification),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified(category: Category) -> Classification {
        Classification {
            category,
            rationale: None,
            raw_model_output: String::new(),
        }
    }

    #[test]
    fn test_route_table() {
        let expected = [
            (Category::Emergency, HandlerKind::Emergency),
            (Category::AdviceRequest, HandlerKind::AdviceDisclaimer),
            (Category::DomainInfo, HandlerKind::DomainInfo),
            (Category::Greeting, HandlerKind::Greeting),
            (Category::Unknown, HandlerKind::AdviceDisclaimer),
        ];

        for (category, handler) in expected {
            // 同一輸入重複呼叫結果不變
            for _ in 0..3 {
                let decision = route(&classified(category));
                assert_eq!(decision.selected_handler, handler);
                assert_eq!(decision.category, category);
            }
        }
    }

    #[test]
    fn test_unknown_ignores_rationale_and_raw_output() {
        let odd = Classification {
            category: Category::Unknown,
            rationale: Some("probably domain info".to_string()),
            raw_model_output: r#"{"category": "DOMAIN_INFO?"}"#.to_string(),
        };
        assert_eq!(route(&odd).selected_handler, HandlerKind::AdviceDisclaimer);
    }

    #[test]
    fn test_direct_mode_keeps_emergency_path() {
        assert_eq!(
            route_direct(&classified(Category::Emergency)).selected_handler,
            HandlerKind::Emergency
        );
        for category in [
            Category::AdviceRequest,
            Category::DomainInfo,
            Category::Greeting,
            Category::Unknown,
        ] {
            assert_eq!(
                route_for_mode(RoutingMode::Direct, &classified(category)).selected_handler,
                HandlerKind::DomainInfo
            );
        }
    }
}
