//! Corrections, bundles, jettison and personalisation management.

mod common;

use std::collections::HashSet;

use common::*;

use gravity::core::ProfileUpdate;
use gravity::domain::{EnergyLevel, FieldCorrection, Gravity, NewTask, Task, TaskStatus};
use gravity::error::PipelineError;
use gravity::Orchestrator;

fn add(orchestrator: &Orchestrator, title: &str, gravity: Gravity, status: TaskStatus) -> Task {
    let mut task = NewTask::inbox(USER, title);
    task.gravity = gravity;
    task.status = status;
    orchestrator.store().insert_task(&task).unwrap()
}

#[test]
fn test_corrections_keep_the_original_transcript() {
    let orchestrator = orchestrator(ScriptedTranscriber::silent(), ScriptedModel::silent());
    let task = add(&orchestrator, "call the gas people", Gravity::Low, TaskStatus::Inbox);

    let saved = orchestrator
        .record_corrections(
            USER,
            task.id,
            &[
                FieldCorrection::new("gravity", Some("Low".into()), Some("High".into())),
                FieldCorrection::new("project", None, Some("Home".into())),
            ],
        )
        .unwrap();

    assert_eq!(saved.len(), 2);
    assert!(saved
        .iter()
        .all(|c| c.transcript.as_deref() == Some("call the gas people")));
    assert!(saved.iter().all(|c| c.task_id == Some(task.id)));

    let recent = orchestrator.store().recent_corrections(USER, 10).unwrap();
    assert_eq!(recent.len(), 2);
}

#[test]
fn test_corrections_validate_input() {
    let orchestrator = orchestrator(ScriptedTranscriber::silent(), ScriptedModel::silent());
    let task = add(&orchestrator, "x", Gravity::Low, TaskStatus::Inbox);

    let err = orchestrator
        .record_corrections(USER, task.id, &[FieldCorrection::new(" ", None, None)])
        .unwrap_err();
    assert!(matches!(err, PipelineError::InvalidInput(_)));

    let err = orchestrator
        .record_corrections(USER, task.id + 100, &[FieldCorrection::new("title", None, None)])
        .unwrap_err();
    assert!(matches!(err, PipelineError::NotFound { .. }));
}

#[test]
fn test_bundle_respects_energy_and_skips_closed_tasks() {
    let orchestrator = orchestrator(ScriptedTranscriber::silent(), ScriptedModel::silent());
    let low = add(&orchestrator, "reply to Jo", Gravity::Low, TaskStatus::Inbox);
    let review = add(&orchestrator, "order filters", Gravity::Low, TaskStatus::InboxReview);
    add(&orchestrator, "done already", Gravity::Low, TaskStatus::Complete);
    let standard = add(&orchestrator, "clean bathroom", Gravity::Standard, TaskStatus::Active);
    let high = add(&orchestrator, "file taxes", Gravity::High, TaskStatus::Inbox);

    let ids = |tasks: Vec<Task>| tasks.into_iter().map(|t| t.id).collect::<HashSet<_>>();

    let tired = ids(orchestrator.bundle(USER, EnergyLevel::Low, Some(10)).unwrap());
    assert_eq!(tired, HashSet::from([low.id, review.id]));

    let okay = ids(orchestrator.bundle(USER, EnergyLevel::Medium, Some(10)).unwrap());
    assert_eq!(okay, HashSet::from([low.id, review.id, standard.id]));

    let wired = ids(orchestrator.bundle(USER, EnergyLevel::High, Some(10)).unwrap());
    assert_eq!(wired, HashSet::from([low.id, review.id, standard.id, high.id]));

    // Default size comes from settings
    assert_eq!(orchestrator.bundle(USER, EnergyLevel::High, None).unwrap().len(), 3);
    assert_eq!(orchestrator.bundle(USER, EnergyLevel::High, Some(1)).unwrap().len(), 1);
}

#[tokio::test]
async fn test_bundle_offers_shards_instead_of_their_parent() {
    let llm = ScriptedModel::replying(&[decomposition_reply(&["Step one", "Step two"])]);
    let orchestrator = orchestrator(ScriptedTranscriber::silent(), llm);
    let parent = add(&orchestrator, "sort the loft", Gravity::Low, TaskStatus::Inbox);

    let shards = orchestrator
        .submit_breakdown(parent.id, USER)
        .await
        .unwrap()
        .shards;

    let bundle: HashSet<_> = orchestrator
        .bundle(USER, EnergyLevel::Low, Some(10))
        .unwrap()
        .into_iter()
        .map(|t| t.id)
        .collect();
    let expected: HashSet<_> = shards.iter().map(|s| s.id).collect();
    assert_eq!(bundle, expected);
}

#[test]
fn test_jettison_resets_unfinished_work() {
    let orchestrator = orchestrator(ScriptedTranscriber::silent(), ScriptedModel::silent());
    add(&orchestrator, "a", Gravity::Low, TaskStatus::Inbox);
    add(&orchestrator, "b", Gravity::Low, TaskStatus::Active);
    add(&orchestrator, "c", Gravity::High, TaskStatus::InboxReview);
    let done = add(&orchestrator, "d", Gravity::Low, TaskStatus::Complete);

    assert_eq!(orchestrator.jettison(USER).unwrap(), 2);

    let inbox = orchestrator.list_tasks(USER, Some(TaskStatus::Inbox)).unwrap();
    assert_eq!(inbox.len(), 3);
    assert_eq!(
        orchestrator.get_task(USER, done.id).unwrap().status,
        TaskStatus::Complete
    );
}

#[test]
fn test_profile_and_reference_data_feed_the_context() {
    let orchestrator = orchestrator(ScriptedTranscriber::silent(), ScriptedModel::silent());

    orchestrator
        .update_profile(
            USER,
            &ProfileUpdate {
                display_name: Some("Sam".into()),
                high_gravity_keywords: Some(vec!["tax".into(), "visa".into()]),
                deepgram_keywords: Some(vec!["Ottolenghi".into()]),
                ..Default::default()
            },
        )
        .unwrap();
    let project = orchestrator.add_project(USER, "Kitchen", None).unwrap();
    orchestrator.add_person(USER, "Jo", Some("partner")).unwrap();

    let context = orchestrator.context_for(USER).unwrap();
    assert_eq!(context.high_gravity_keywords, vec!["tax", "visa"]);
    assert_eq!(context.vocabulary, vec!["Ottolenghi", "Kitchen", "Jo"]);

    orchestrator.delete_project(USER, project.id).unwrap();
    assert!(orchestrator.list_projects(USER).unwrap().is_empty());
    assert!(matches!(
        orchestrator.delete_project(USER, project.id),
        Err(PipelineError::NotFound { entity: "project", .. })
    ));
    assert!(matches!(
        orchestrator.add_person(USER, "  ", None),
        Err(PipelineError::InvalidInput(_))
    ));
}
