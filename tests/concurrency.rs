//! Concurrent toggles against one shared store.

use std::collections::BTreeSet;
use std::sync::{Arc, Barrier};
use std::thread;

use craftable::{
    ActorId, CraftConfig, CraftEngine, DocumentStore, EngagementTarget, InMemoryDocumentStore, NewComment, NewPost,
    PostId, StaticAuth, SubscriptionConfig,
};

fn engine_for(store: &Arc<dyn DocumentStore>, actor: &str) -> CraftEngine {
    let auth = Arc::new(StaticAuth::signed_in(ActorId::new(actor).unwrap()));
    CraftEngine::with_config(Arc::clone(store), auth, CraftConfig::default())
}

/// Heavily contended tests get a generous retry budget so a thread that keeps
/// losing the race still lands.
fn shared_post(max_attempts: u32) -> (Arc<dyn DocumentStore>, PostId) {
    let store: Arc<dyn DocumentStore> =
        Arc::new(InMemoryDocumentStore::with_options(max_attempts, SubscriptionConfig::default()));
    let post_id = engine_for(&store, "host")
        .create_post(&NewPost::new("Shared", "everyone likes this", "c2hhcmVk"))
        .unwrap();
    (store, post_id)
}

#[test]
fn test_two_simultaneous_likes_both_count() {
    for _ in 0..20 {
        let (store, post_id) = shared_post(craftable::storage::DEFAULT_MAX_ATTEMPTS);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = ["a", "b"]
            .into_iter()
            .map(|name| {
                let engine = engine_for(&store, name);
                let post_id = post_id.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    engine.set_post_liked(&post_id, true).unwrap()
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let record = engine_for(&store, "host")
            .engagement(&EngagementTarget::post(post_id))
            .unwrap();
        assert_eq!(record.count(), 2);
        assert_eq!(record.engaged_by().len(), 2);
    }
}

#[test]
fn test_many_actors_end_in_their_last_intent() {
    const ACTORS: usize = 12;
    const ROUNDS: usize = 25;

    let (store, post_id) = shared_post(10_000);
    let barrier = Arc::new(Barrier::new(ACTORS));

    let handles: Vec<_> = (0..ACTORS)
        .map(|i| {
            let engine = engine_for(&store, &format!("actor{i}"));
            let post_id = post_id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                // Even actors end liked, odd actors end not liked.
                let rounds = if i % 2 == 0 { ROUNDS } else { ROUNDS + 1 };
                for round in 0..rounds {
                    engine.set_post_liked(&post_id, round % 2 == 0).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let record = engine_for(&store, "host")
        .engagement(&EngagementTarget::post(post_id))
        .unwrap();
    let expected: BTreeSet<ActorId> = (0..ACTORS)
        .filter(|i| i % 2 == 0)
        .map(|i| ActorId::new(format!("actor{i}")).unwrap())
        .collect();
    assert_eq!(record.engaged_by(), &expected);
    assert_eq!(record.count(), expected.len() as u64);
}

#[test]
fn test_comment_likes_and_new_comments_interleave() {
    let (store, post_id) = shared_post(10_000);
    let comment = engine_for(&store, "host")
        .add_comment(&post_id, &NewComment::new("first!"))
        .unwrap();

    let likers: Vec<_> = (0..6)
        .map(|i| {
            let engine = engine_for(&store, &format!("liker{i}"));
            let post_id = post_id.clone();
            let comment = comment.clone();
            thread::spawn(move || {
                engine.set_comment_liked(&post_id, &[comment], true).unwrap();
                engine.set_post_liked(&post_id, true).unwrap();
            })
        })
        .collect();
    let commenters: Vec<_> = (0..3)
        .map(|i| {
            let engine = engine_for(&store, &format!("commenter{i}"));
            let post_id = post_id.clone();
            let comment = comment.clone();
            thread::spawn(move || {
                engine
                    .add_reply(&post_id, &[comment], &NewComment::new("agreed"))
                    .unwrap();
            })
        })
        .collect();
    for handle in likers.into_iter().chain(commenters) {
        handle.join().unwrap();
    }

    let post = engine_for(&store, "host").post(&post_id).unwrap();
    assert_eq!(post.engagement.count(), 6);
    assert_eq!(post.comments[0].engagement.count(), 6);
    assert_eq!(post.comments[0].replies.len(), 3);
    assert_eq!(post.title, "Shared");
}
