//! Property tests for aggregate status derivation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::Utc;
use crosspost_core::{
    reconcile::{derive_aggregate_status, reconcile_in_place, ChannelClass, Finalize},
    AggregateStatus, ChannelState, ChannelStatus, ContentItem, PublishOutcome,
};
use proptest::prelude::*;

fn status_strategy() -> impl Strategy<Value = ChannelStatus> {
    prop_oneof![
        Just(ChannelStatus::Pending),
        Just(ChannelStatus::Scheduled),
        Just(ChannelStatus::Published),
        Just(ChannelStatus::Failed),
    ]
}

fn channel_strategy() -> impl Strategy<Value = ChannelState> {
    (any::<bool>(), status_strategy(), any::<bool>()).prop_map(|(selected, status, errored)| {
        ChannelState {
            selected,
            error: errored.then(|| "boom".to_string()),
            ..ChannelState::default().with_status(status)
        }
    })
}

fn item_with(states: &[ChannelState], status: AggregateStatus) -> ContentItem {
    states
        .iter()
        .enumerate()
        .fold(ContentItem::new("c-1", status), |item, (i, state)| {
            item.with_channel(&format!("ch{i}"), state.clone())
        })
}

fn outcome(published: bool) -> PublishOutcome {
    if published {
        PublishOutcome::published("https://example.test/post")
    } else {
        PublishOutcome::failed("rejected")
    }
}

/// Apply outcomes one channel at a time in `order`, reconciling after each.
/// Returns the status after every step.
fn replay(outcomes: &[bool], order: &[usize]) -> Vec<AggregateStatus> {
    let states = vec![ChannelState::selected_pending(); outcomes.len()];
    let mut item = item_with(&states, AggregateStatus::Scheduled);
    let now = Utc::now();

    order
        .iter()
        .map(|&i| {
            let name = crosspost_core::ChannelName::parse(&format!("ch{i}")).unwrap();
            item.channel_states
                .get_mut(&name)
                .unwrap()
                .apply_outcome(&outcome(outcomes[i]), now);
            reconcile_in_place(&mut item, Finalize::Observed, now);
            item.aggregate_status
        })
        .collect()
}

fn outcomes_and_order() -> impl Strategy<Value = (Vec<bool>, Vec<usize>)> {
    prop::collection::vec(any::<bool>(), 1..8).prop_flat_map(|outcomes| {
        let order: Vec<usize> = (0..outcomes.len()).collect();
        (Just(outcomes), Just(order).prop_shuffle())
    })
}

proptest! {
    #[test]
    fn final_status_is_independent_of_completion_order((outcomes, order) in outcomes_and_order()) {
        let in_order: Vec<usize> = (0..outcomes.len()).collect();
        let a = replay(&outcomes, &in_order);
        let b = replay(&outcomes, &order);
        prop_assert_eq!(a.last(), b.last());
    }

    #[test]
    fn never_published_while_a_channel_is_pending((outcomes, order) in outcomes_and_order()) {
        let steps = replay(&outcomes, &order);
        let (last, intermediate) = steps.split_last().unwrap();
        for status in intermediate {
            prop_assert_eq!(*status, AggregateStatus::Scheduled);
        }
        let expected = if outcomes.iter().any(|&published| published) {
            AggregateStatus::Published
        } else {
            AggregateStatus::Failed
        };
        prop_assert_eq!(*last, expected);
    }

    #[test]
    fn derivation_follows_partition(states in prop::collection::vec(channel_strategy(), 0..8)) {
        let item = item_with(&states, AggregateStatus::Scheduled);
        let result = derive_aggregate_status(&item);
        let partition = &result.partition;

        let expected = if partition.is_empty() || !partition.pending.is_empty() {
            AggregateStatus::Scheduled
        } else if !partition.published.is_empty() {
            AggregateStatus::Published
        } else {
            AggregateStatus::Failed
        };
        prop_assert_eq!(result.status, expected);
        prop_assert_eq!(result.should_persist, expected != AggregateStatus::Scheduled);
    }

    #[test]
    fn unselected_channels_never_matter(
        states in prop::collection::vec(channel_strategy(), 0..6),
        noise in prop::collection::vec(status_strategy(), 0..4),
    ) {
        let base = item_with(&states, AggregateStatus::Scheduled);
        let noisy = noise.iter().enumerate().fold(base.clone(), |item, (i, status)| {
            item.with_channel(
                &format!("unselected{i}"),
                ChannelState { selected: false, ..ChannelState::default().with_status(*status) },
            )
        });
        prop_assert_eq!(
            derive_aggregate_status(&base).status,
            derive_aggregate_status(&noisy).status
        );
    }

    #[test]
    fn draft_with_work_becomes_scheduled(
        states in prop::collection::vec(channel_strategy(), 1..6)
    ) {
        let item = item_with(&states, AggregateStatus::Draft);
        let result = derive_aggregate_status(&item);
        if !result.partition.pending.is_empty() {
            prop_assert_eq!(result.status, AggregateStatus::Scheduled);
        }
    }
}

#[test]
fn classification_prefers_published_over_stale_error() {
    let state = ChannelState {
        error: Some("earlier timeout".into()),
        post_url: Some("https://t.me/c/1".into()),
        ..ChannelState::default().with_status(ChannelStatus::Published)
    };
    assert_eq!(
        crosspost_core::reconcile::classify(&state),
        ChannelClass::Published
    );
}

#[test]
fn finalize_request_publishes_item_without_channels() {
    let item = ContentItem::new("c-1", AggregateStatus::Draft);
    assert_eq!(derive_aggregate_status(&item).status, AggregateStatus::Draft);
    assert_eq!(
        crosspost_core::reconcile::derive_aggregate_status_with(&item, Finalize::Requested).status,
        AggregateStatus::Published
    );
}
