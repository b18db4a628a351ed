use shingo_core::common::SignalType;
use shingo_core::signal::entity::{
    ComponentScore, DivergenceType, OrderflowTag, PatternResult, SignalPattern,
};
use std::collections::BTreeMap;

// 订单流与技术面分差超过该值才进入背离判定
const DIVERGENCE_SPREAD: f64 = 20.0;
// 三分量极差小于该值视为一致确认
const CONFIRMATION_SPREAD: f64 = 15.0;
// 做多动量下限 / 做空动量上限
const MOMENTUM_LONG_FLOOR: f64 = 65.0;
const MOMENTUM_SHORT_CEIL: f64 = 35.0;
// 侵略性标签阈值
const AGGRESSION_THRESHOLD: f64 = 0.7;

/// # Summary
/// 对一组上游分量评分做形态分类并提取辅助标签。
/// 纯函数：无状态、无副作用，分量缺失时以 50 分兜底，永不报错。
///
/// # Logic
/// 1. 提取 technical / orderflow / volume 三个代表性评分。
/// 2. 依次套用背离、确认、动量规则，全部不命中时归为 other。
/// 3. 独立提取订单流标签与触发分量 (与形态分类互不影响)。
///
/// # Arguments
/// * `components`: 宽松解码后的分量评分映射 (有序)。
/// * `signal_type`: 信号方向，背离与动量规则依赖方向解读。
///
/// # Returns
/// 形态分类结果。
pub fn classify(
    components: &BTreeMap<String, ComponentScore>,
    signal_type: SignalType,
) -> PatternResult {
    let technical = score_of(components, "technical");
    let orderflow = score_of(components, "orderflow");
    let volume = score_of(components, "volume");

    let (pattern, divergence_type) =
        classify_scores(technical, orderflow, volume, signal_type);

    PatternResult {
        pattern,
        divergence_type,
        orderflow_tags: extract_orderflow_tags(components),
        trigger_component: trigger_component(components),
    }
}

fn score_of(components: &BTreeMap<String, ComponentScore>, name: &str) -> f64 {
    components.get(name).map_or(50.0, |c| c.score)
}

/// # Summary
/// 三分量形态规则。
///
/// # Logic
/// 1. 背离：分差 > 20 且方向吻合逆向解读 (做多要求订单流强/技术弱，
///    做空相反)。分差够大但方向不吻合时不强行归类，落入后续规则。
/// 2. 确认：三分量极差 < 15。
/// 3. 动量：做多要求最小分量 > 65；做空要求最大分量 < 35。
fn classify_scores(
    technical: f64,
    orderflow: f64,
    volume: f64,
    signal_type: SignalType,
) -> (SignalPattern, Option<DivergenceType>) {
    if (orderflow - technical).abs() > DIVERGENCE_SPREAD {
        match signal_type {
            SignalType::Long if orderflow > 60.0 && technical < 40.0 => {
                return (
                    SignalPattern::Divergence,
                    Some(DivergenceType::BullishDivergence),
                );
            }
            SignalType::Short if orderflow < 40.0 && technical > 60.0 => {
                return (
                    SignalPattern::Divergence,
                    Some(DivergenceType::BearishDivergence),
                );
            }
            _ => {}
        }
    }

    let max = technical.max(orderflow).max(volume);
    let min = technical.min(orderflow).min(volume);

    if max - min < CONFIRMATION_SPREAD {
        return (SignalPattern::Confirmation, None);
    }

    let momentum = match signal_type {
        SignalType::Long => min > MOMENTUM_LONG_FLOOR,
        SignalType::Short => max < MOMENTUM_SHORT_CEIL,
    };
    if momentum {
        return (SignalPattern::Momentum, None);
    }

    (SignalPattern::Other, None)
}

/// # Summary
/// 从 orderflow 子记录提取特征标签。标签独立于形态分类累积，
/// 单个信号可同时携带多个。
pub fn extract_orderflow_tags(
    components: &BTreeMap<String, ComponentScore>,
) -> Vec<OrderflowTag> {
    let mut tags = Vec::new();
    let Some(of) = components.get("orderflow") else {
        return tags;
    };

    if of
        .buyer_aggression
        .is_some_and(|a| a > AGGRESSION_THRESHOLD)
    {
        tags.push(OrderflowTag::HighBuyerAggression);
    }
    if of
        .seller_aggression
        .is_some_and(|a| a > AGGRESSION_THRESHOLD)
    {
        tags.push(OrderflowTag::HighSellerAggression);
    }
    if of.absorption_detected {
        tags.push(OrderflowTag::AbsorptionDetected);
    }
    if of.large_orders {
        tags.push(OrderflowTag::LargeOrders);
    }
    if of.iceberg_detected {
        tags.push(OrderflowTag::IcebergDetected);
    }
    tags
}

/// # Summary
/// 识别评分最高的触发分量。
/// 并列时取遍历顺序中先出现者；BTreeMap 保证该顺序是分量名的字典序。
fn trigger_component(components: &BTreeMap<String, ComponentScore>) -> Option<String> {
    let mut best: Option<(&str, f64)> = None;
    for (name, component) in components {
        let beats = best.is_none_or(|(_, score)| component.score > score);
        if beats {
            best = Some((name, component.score));
        }
    }
    best.map(|(name, _)| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(entries: &[(&str, f64)]) -> BTreeMap<String, ComponentScore> {
        entries
            .iter()
            .map(|(name, score)| {
                (
                    name.to_string(),
                    ComponentScore {
                        score: *score,
                        ..ComponentScore::default()
                    },
                )
            })
            .collect()
    }

    #[test]
    fn test_bullish_divergence_for_long() {
        let components = scores(&[("technical", 30.0), ("orderflow", 75.0), ("volume", 50.0)]);
        let result = classify(&components, SignalType::Long);
        assert_eq!(result.pattern, SignalPattern::Divergence);
        assert_eq!(
            result.divergence_type,
            Some(DivergenceType::BullishDivergence)
        );
    }

    #[test]
    fn test_bearish_divergence_for_short() {
        let components = scores(&[("technical", 70.0), ("orderflow", 25.0), ("volume", 50.0)]);
        let result = classify(&components, SignalType::Short);
        assert_eq!(result.pattern, SignalPattern::Divergence);
        assert_eq!(
            result.divergence_type,
            Some(DivergenceType::BearishDivergence)
        );
    }

    #[test]
    fn test_divergent_scores_with_wrong_direction_fall_through() {
        // 分差 > 20 但方向与逆向解读不符，不得强行归类为背离
        let components = scores(&[("technical", 30.0), ("orderflow", 75.0), ("volume", 50.0)]);
        let result = classify(&components, SignalType::Short);
        assert_eq!(result.pattern, SignalPattern::Other);
        assert!(result.divergence_type.is_none());
    }

    #[test]
    fn test_confirmation_when_components_agree() {
        let components = scores(&[("technical", 70.0), ("orderflow", 72.0), ("volume", 68.0)]);
        let result = classify(&components, SignalType::Long);
        assert_eq!(result.pattern, SignalPattern::Confirmation);
    }

    #[test]
    fn test_momentum_rules_by_direction() {
        let strong = scores(&[("technical", 80.0), ("orderflow", 66.0), ("volume", 90.0)]);
        assert_eq!(
            classify(&strong, SignalType::Long).pattern,
            SignalPattern::Momentum
        );

        let weak = scores(&[("technical", 20.0), ("orderflow", 34.0), ("volume", 10.0)]);
        assert_eq!(
            classify(&weak, SignalType::Short).pattern,
            SignalPattern::Momentum
        );

        // 同样的弱势分量对做多而言只是 other
        assert_eq!(
            classify(&weak, SignalType::Long).pattern,
            SignalPattern::Other
        );
    }

    #[test]
    fn test_missing_components_default_to_midline() {
        // 空映射：三分量全部兜底为 50，极差 0 -> 确认形态
        let result = classify(&BTreeMap::new(), SignalType::Long);
        assert_eq!(result.pattern, SignalPattern::Confirmation);
        assert!(result.trigger_component.is_none());
        assert!(result.orderflow_tags.is_empty());
    }

    #[test]
    fn test_orderflow_tags() {
        let mut components = scores(&[("technical", 50.0)]);
        components.insert(
            "orderflow".to_string(),
            ComponentScore {
                score: 80.0,
                buyer_aggression: Some(0.85),
                seller_aggression: Some(0.3),
                absorption_detected: true,
                large_orders: false,
                iceberg_detected: true,
            },
        );
        let tags = extract_orderflow_tags(&components);
        assert_eq!(
            tags,
            vec![
                OrderflowTag::HighBuyerAggression,
                OrderflowTag::AbsorptionDetected,
                OrderflowTag::IcebergDetected,
            ]
        );
    }

    #[test]
    fn test_trigger_component_tie_break() {
        let components = scores(&[("volume", 80.0), ("momentum", 80.0), ("technical", 60.0)]);
        // 并列最高分时取字典序靠前者
        let result = classify(&components, SignalType::Long);
        assert_eq!(result.trigger_component.as_deref(), Some("momentum"));
    }
}
