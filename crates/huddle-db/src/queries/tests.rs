use chrono::{Duration, Utc};
use huddle_types::models::PresenceStatus;
use huddle_types::pagination::PageQuery;
use uuid::Uuid;

use crate::queries::files::NewFile;
use crate::{Database, StoreError};

fn db() -> Database {
    Database::open_in_memory().unwrap()
}

fn user(db: &Database, name: &str) -> Uuid {
    db.create_user(&format!("{}@example.com", name), "hash", name)
        .unwrap()
        .id
}

fn first_page() -> PageQuery {
    PageQuery::default()
}

fn file(db: &Database, uploader: Uuid) -> Uuid {
    db.register_file(
        uploader,
        NewFile {
            name: "notes.txt",
            mime_type: "text/plain",
            size: 12,
            locator: "uploads/notes.txt",
            url: "https://files.example.com/notes.txt",
        },
    )
    .unwrap()
    .id
}

#[test]
fn eng_channel_walkthrough() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");

    let eng = db.create_channel(a, "eng", false).unwrap();
    assert_eq!(eng.member_count, 1);

    let m1 = db.create_message(eng.id, a, "ship it", &[]).unwrap();
    let r1 = db.create_reply(m1.id, a, "first", &[]).unwrap();
    db.create_reply(m1.id, a, "second", &[]).unwrap();
    assert_eq!(r1.thread_id, Some(m1.id));
    assert_eq!(r1.channel_id, eng.id);

    db.join_channel(eng.id, b).unwrap();
    assert_eq!(db.unread_count(b, eng.id).unwrap(), 1);

    db.mark_read(b, eng.id, m1.id).unwrap();
    assert_eq!(db.unread_count(b, eng.id).unwrap(), 0);

    assert_eq!(db.get_message(m1.id, a).unwrap().reply_count, 2);
    db.delete_message(r1.id, a).unwrap();
    assert_eq!(db.get_message(m1.id, a).unwrap().reply_count, 1);
}

#[test]
fn replies_never_count_as_unread() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "general", false).unwrap();
    db.join_channel(ch.id, b).unwrap();

    let parent = db.create_message(ch.id, a, "question", &[]).unwrap();
    db.mark_read(b, ch.id, parent.id).unwrap();

    for i in 0..5 {
        db.create_reply(parent.id, a, &format!("answer {}", i), &[]).unwrap();
    }
    assert_eq!(db.unread_count(b, ch.id).unwrap(), 0);

    db.create_message(ch.id, a, "new topic", &[]).unwrap();
    assert_eq!(db.unread_count(b, ch.id).unwrap(), 1);
}

#[test]
fn without_a_pointer_everything_is_unread() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "general", false).unwrap();
    for i in 0..3 {
        db.create_message(ch.id, a, &format!("m{}", i), &[]).unwrap();
    }
    db.join_channel(ch.id, b).unwrap();

    assert!(db.read_pointer(b, ch.id).unwrap().is_none());
    assert_eq!(db.unread_count(b, ch.id).unwrap(), 3);
}

#[test]
fn nested_replies_are_rejected_for_everyone() {
    let db = db();
    let a = user(&db, "ada");
    let outsider = user(&db, "eve");
    let ch = db.create_channel(a, "general", false).unwrap();
    let parent = db.create_message(ch.id, a, "root", &[]).unwrap();
    let reply = db.create_reply(parent.id, a, "reply", &[]).unwrap();

    assert!(matches!(
        db.create_reply(reply.id, a, "nested", &[]),
        Err(StoreError::NestedThread)
    ));
    assert!(matches!(
        db.create_reply(reply.id, outsider, "nested", &[]),
        Err(StoreError::NestedThread)
    ));
    assert!(matches!(
        db.create_reply(parent.id, outsider, "hi", &[]),
        Err(StoreError::NotMember)
    ));
}

#[test]
fn replying_to_a_tombstone_is_not_found() {
    let db = db();
    let a = user(&db, "ada");
    let ch = db.create_channel(a, "general", false).unwrap();
    let parent = db.create_message(ch.id, a, "root", &[]).unwrap();
    db.delete_message(parent.id, a).unwrap();

    assert!(matches!(
        db.create_reply(parent.id, a, "late", &[]),
        Err(StoreError::NotFound(_))
    ));
    assert!(matches!(
        db.create_reply(Uuid::new_v4(), a, "ghost", &[]),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn soft_delete_hides_message_but_keeps_reactions_and_files() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "general", false).unwrap();
    db.join_channel(ch.id, b).unwrap();

    let attachment = file(&db, a);
    let m = db.create_message(ch.id, a, "with file", &[attachment]).unwrap();
    let (_, reaction) = db.add_reaction(m.id, b, "fire").unwrap();
    assert_eq!(db.unread_count(b, ch.id).unwrap(), 1);

    db.delete_message(m.id, a).unwrap();

    let listing = db.list_channel_messages(ch.id, a, &first_page()).unwrap();
    assert!(listing.items.iter().all(|row| row.id != m.id));
    assert!(matches!(db.get_message(m.id, a), Err(StoreError::NotFound(_))));
    assert!(matches!(db.list_thread(m.id, a, &first_page()), Err(StoreError::NotFound(_))));
    assert_eq!(db.unread_count(b, ch.id).unwrap(), 0);

    assert_eq!(db.get_reaction(reaction.id, a).unwrap().emoji, "fire");
    assert_eq!(db.get_file_for(attachment, b).unwrap().message_id, Some(m.id));
}

#[test]
fn tombstones_reject_every_mutation() {
    let db = db();
    let a = user(&db, "ada");
    let ch = db.create_channel(a, "general", false).unwrap();
    let m = db.create_message(ch.id, a, "soon gone", &[]).unwrap();
    db.delete_message(m.id, a).unwrap();

    assert!(matches!(db.delete_message(m.id, a), Err(StoreError::NotFound(_))));
    assert!(matches!(db.edit_message(m.id, a, "again"), Err(StoreError::NotFound(_))));
    assert!(matches!(db.pin_message(m.id, a), Err(StoreError::NotFound(_))));
    assert!(matches!(db.add_reaction(m.id, a, "fire"), Err(StoreError::NotFound(_))));
    assert!(matches!(db.mark_read(a, ch.id, m.id), Err(StoreError::NotFound(_))));
}

#[test]
fn only_the_author_edits_or_deletes() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "general", false).unwrap();
    db.join_channel(ch.id, b).unwrap();
    let m = db.create_message(ch.id, a, "mine", &[]).unwrap();

    assert!(matches!(db.delete_message(m.id, b), Err(StoreError::Forbidden(_))));
    assert!(matches!(db.edit_message(m.id, b, "theirs"), Err(StoreError::Forbidden(_))));

    let edited = db.edit_message(m.id, a, "still mine").unwrap();
    assert_eq!(edited.content, "still mine");
    assert!(edited.edited_at.is_some());
}

#[test]
fn mark_read_checks_channel_and_accepts_backward_moves() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let one = db.create_channel(a, "one", false).unwrap();
    let two = db.create_channel(a, "two", false).unwrap();
    db.join_channel(one.id, b).unwrap();

    let elsewhere = db.create_message(two.id, a, "other channel", &[]).unwrap();
    assert!(matches!(
        db.mark_read(b, one.id, elsewhere.id),
        Err(StoreError::NotFound(_))
    ));

    let first = db.create_message(one.id, a, "first", &[]).unwrap();
    let second = db.create_message(one.id, a, "second", &[]).unwrap();
    db.mark_read(b, one.id, second.id).unwrap();
    assert_eq!(db.unread_count(b, one.id).unwrap(), 0);

    let pointer = db.mark_read(b, one.id, first.id).unwrap();
    assert_eq!(pointer.last_read_message_id, first.id);
    assert_eq!(db.unread_count(b, one.id).unwrap(), 1);

    let outsider = user(&db, "eve");
    assert!(matches!(
        db.mark_read(outsider, one.id, first.id),
        Err(StoreError::NotMember)
    ));
    assert!(matches!(db.unread_count(outsider, one.id), Err(StoreError::NotMember)));
}

#[test]
fn viewing_the_newest_page_advances_the_pointer() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "general", false).unwrap();
    db.join_channel(ch.id, b).unwrap();
    db.create_message(ch.id, a, "one", &[]).unwrap();
    let newest = db.create_message(ch.id, a, "two", &[]).unwrap();

    assert_eq!(db.unread_count(b, ch.id).unwrap(), 2);
    db.list_channel_messages(ch.id, b, &first_page()).unwrap();
    assert_eq!(db.unread_count(b, ch.id).unwrap(), 0);
    assert_eq!(
        db.read_pointer(b, ch.id).unwrap().unwrap().last_read_message_id,
        newest.id
    );
}

#[test]
fn duplicate_reactions_are_rejected() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "general", false).unwrap();
    db.join_channel(ch.id, b).unwrap();
    let m = db.create_message(ch.id, a, "launch", &[]).unwrap();

    db.add_reaction(m.id, a, "fire").unwrap();
    assert!(matches!(
        db.add_reaction(m.id, a, "fire"),
        Err(StoreError::AlreadyExists(_))
    ));
    db.add_reaction(m.id, b, "fire").unwrap();

    let fire = db
        .get_reactions_for_messages(&[m.id])
        .unwrap()
        .into_iter()
        .filter(|r| r.emoji == "fire")
        .count();
    assert_eq!(fire, 2);

    db.remove_reaction(m.id, a, "fire").unwrap();
    assert!(matches!(
        db.remove_reaction(m.id, a, "fire"),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn channel_names_and_memberships_are_unique() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    db.create_channel(a, "eng", false).unwrap();

    assert!(matches!(
        db.create_channel(b, "eng", false),
        Err(StoreError::AlreadyExists(_))
    ));
    assert!(matches!(
        db.create_channel(b, "../eng", false),
        Err(StoreError::InvalidInput(_))
    ));

    let ch = db.create_channel(a, "design", false).unwrap();
    db.join_channel(ch.id, b).unwrap();
    assert!(matches!(db.join_channel(ch.id, b), Err(StoreError::AlreadyExists(_))));
}

#[test]
fn private_channels_need_an_invitation() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let secret = db.create_channel(a, "secret", true).unwrap();

    assert!(matches!(db.join_channel(secret.id, b), Err(StoreError::Forbidden(_))));
    assert!(matches!(db.add_member(secret.id, b, b), Err(StoreError::NotMember)));

    let updated = db.add_member(secret.id, a, b).unwrap();
    assert_eq!(updated.member_count, 2);

    let browse = db.browse_channels(&first_page()).unwrap();
    assert!(browse.items.iter().all(|c| c.id != secret.id));
}

#[test]
fn last_member_cannot_leave() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "general", false).unwrap();

    assert!(matches!(db.leave_channel(ch.id, a), Err(StoreError::Forbidden(_))));

    db.join_channel(ch.id, b).unwrap();
    db.leave_channel(ch.id, a).unwrap();
    assert!(!db.is_member(ch.id, a).unwrap());
    assert!(matches!(db.leave_channel(ch.id, a), Err(StoreError::NotMember)));
    assert!(matches!(db.leave_channel(ch.id, b), Err(StoreError::Forbidden(_))));
}

#[test]
fn channel_list_carries_unread_counts_for_members_only() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let joined = db.create_channel(a, "joined", false).unwrap();
    let other = db.create_channel(a, "other", false).unwrap();
    db.join_channel(joined.id, b).unwrap();
    db.create_message(joined.id, a, "one", &[]).unwrap();
    db.create_message(joined.id, a, "two", &[]).unwrap();
    db.create_message(other.id, a, "elsewhere", &[]).unwrap();

    let page = db.list_user_channels(b, &first_page()).unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].channel.id, joined.id);
    assert_eq!(page.items[0].unread_count, 2);

    // The author's own posts advance their pointer.
    let page = db.list_user_channels(a, &first_page()).unwrap();
    assert!(page.items.iter().all(|c| c.unread_count == 0));
}

#[test]
fn message_pages_walk_backward_with_a_cursor() {
    let db = db();
    let a = user(&db, "ada");
    let ch = db.create_channel(a, "general", false).unwrap();
    let ids: Vec<Uuid> = (0..5)
        .map(|i| db.create_message(ch.id, a, &format!("m{}", i), &[]).unwrap().id)
        .collect();

    let first = db
        .list_channel_messages(ch.id, a, &PageQuery::new(Some(2), None))
        .unwrap();
    assert_eq!(first.items.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);
    assert!(first.has_more);

    let second = db
        .list_channel_messages(ch.id, a, &PageQuery::new(Some(2), first.next_cursor))
        .unwrap();
    assert_eq!(second.items.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);

    let last = db
        .list_channel_messages(ch.id, a, &PageQuery::new(Some(2), second.next_cursor))
        .unwrap();
    assert_eq!(last.items.len(), 1);
    assert!(!last.has_more);
    assert!(last.next_cursor.is_none());

    assert!(matches!(
        db.list_channel_messages(ch.id, a, &PageQuery::new(None, Some(Uuid::new_v4()))),
        Err(StoreError::InvalidInput(_))
    ));
}

#[test]
fn thread_listing_skips_deleted_replies() {
    let db = db();
    let a = user(&db, "ada");
    let ch = db.create_channel(a, "general", false).unwrap();
    let parent = db.create_message(ch.id, a, "root", &[]).unwrap();
    let r1 = db.create_reply(parent.id, a, "one", &[]).unwrap();
    let r2 = db.create_reply(parent.id, a, "two", &[]).unwrap();
    db.delete_message(r1.id, a).unwrap();

    let (head, replies) = db.list_thread(parent.id, a, &first_page()).unwrap();
    assert_eq!(head.id, parent.id);
    assert_eq!(head.reply_count, 1);
    assert_eq!(replies.items.len(), 1);
    assert_eq!(replies.items[0].id, r2.id);

    let top = db.list_channel_messages(ch.id, a, &first_page()).unwrap();
    assert_eq!(top.items.len(), 1);
}

#[test]
fn files_attach_once() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "general", false).unwrap();
    db.join_channel(ch.id, b).unwrap();

    let f = file(&db, a);
    db.create_message(ch.id, a, "here", &[f]).unwrap();
    assert!(matches!(
        db.create_message(ch.id, a, "again", &[f]),
        Err(StoreError::AlreadyExists(_))
    ));

    let theirs = file(&db, a);
    assert!(matches!(
        db.create_message(ch.id, b, "borrowed", &[theirs]),
        Err(StoreError::Forbidden(_))
    ));
    // The failed send left nothing behind.
    assert_eq!(db.get_file_for(theirs, a).unwrap().message_id, None);
}

#[test]
fn file_visibility_follows_channel_membership() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let outsider = user(&db, "eve");
    let ch = db.create_channel(a, "general", false).unwrap();
    db.join_channel(ch.id, b).unwrap();

    let f = file(&db, a);
    assert!(matches!(db.get_file_for(f, b), Err(StoreError::NotFound(_))));

    let msg = db.create_message(ch.id, a, "plan attached", &[f]).unwrap();
    db.delete_message(msg.id, a).unwrap();
    assert_eq!(db.get_file_for(f, b).unwrap().message_id, Some(msg.id));
    assert!(matches!(db.get_file_for(f, outsider), Err(StoreError::NotMember)));
}

#[test]
fn pins_are_idempotent() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "general", false).unwrap();
    db.join_channel(ch.id, b).unwrap();
    let m = db.create_message(ch.id, a, "important", &[]).unwrap();

    let pinned = db.pin_message(m.id, a).unwrap();
    let again = db.pin_message(m.id, b).unwrap();
    assert_eq!(again.pinned_by, Some(a));
    assert_eq!(again.pinned_at, pinned.pinned_at);
    assert_eq!(db.list_pinned(ch.id, b, &first_page()).unwrap().items.len(), 1);

    db.unpin_message(m.id, b).unwrap();
    let cleared = db.unpin_message(m.id, b).unwrap();
    assert!(cleared.pinned_by.is_none());
    assert!(db.list_pinned(ch.id, b, &first_page()).unwrap().items.is_empty());
}

#[test]
fn direct_messages_round_trip() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");

    let hello = db.send_direct_message(a, b, "hello").unwrap();
    db.send_direct_message(b, a, "hi back").unwrap();
    db.send_direct_message(a, b, "lunch?").unwrap();

    let convo = db.list_conversation(b, a, &first_page()).unwrap();
    assert_eq!(convo.items.len(), 3);
    assert_eq!(db.unread_direct_count(b, a).unwrap(), 2);

    assert_eq!(db.mark_conversation_read(b, a).unwrap(), 2);
    assert_eq!(db.unread_direct_count(b, a).unwrap(), 0);

    assert!(matches!(
        db.delete_direct_message(hello.id, b),
        Err(StoreError::Forbidden(_))
    ));
    db.delete_direct_message(hello.id, a).unwrap();
    assert!(matches!(
        db.delete_direct_message(hello.id, a),
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(db.list_conversation(a, b, &first_page()).unwrap().items.len(), 2);

    assert!(matches!(
        db.send_direct_message(a, Uuid::new_v4(), "anyone?"),
        Err(StoreError::NotFound(_))
    ));
}

#[test]
fn purge_removes_old_tombstones_and_keeps_unread_stable() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "general", false).unwrap();
    db.join_channel(ch.id, b).unwrap();

    let parent = db.create_message(ch.id, a, "root", &[]).unwrap();
    let reply = db.create_reply(parent.id, a, "reply", &[]).unwrap();
    let (_, reaction) = db.add_reaction(parent.id, b, "fire").unwrap();
    db.mark_read(b, ch.id, parent.id).unwrap();
    db.create_message(ch.id, a, "after", &[]).unwrap();

    db.delete_message(parent.id, a).unwrap();
    assert_eq!(db.purge_tombstones(Utc::now() + Duration::hours(1)).unwrap(), 0);

    db.delete_message(reply.id, a).unwrap();
    assert_eq!(db.purge_tombstones(Utc::now() - Duration::hours(1)).unwrap(), 0);
    assert_eq!(db.purge_tombstones(Utc::now() + Duration::hours(1)).unwrap(), 2);

    assert!(matches!(db.get_reaction(reaction.id, b), Err(StoreError::NotFound(_))));
    assert_eq!(db.unread_count(b, ch.id).unwrap(), 1);
}

#[test]
fn presence_updates_keep_last_seen_unless_given() {
    let db = db();
    let a = user(&db, "ada");
    let seen = Utc::now();

    let row = db.set_presence(a, PresenceStatus::Offline, Some(seen)).unwrap();
    assert_eq!(row.last_seen, Some(seen));

    let row = db.set_presence(a, PresenceStatus::Online, None).unwrap();
    assert_eq!(row.status, PresenceStatus::Online);
    assert_eq!(row.last_seen, Some(seen));
}

#[test]
fn duplicate_emails_are_rejected() {
    let db = db();
    user(&db, "ada");
    assert!(matches!(
        db.create_user("ADA@example.com", "hash", "Ada Again"),
        Err(StoreError::AlreadyExists(_))
    ));
    assert!(db.get_user_by_email("Ada@Example.com").unwrap().is_some());
}

#[test]
fn authors_keep_their_messages_after_leaving() {
    let db = db();
    let a = user(&db, "ada");
    let b = user(&db, "bob");
    let ch = db.create_channel(a, "eng", false).unwrap();
    db.join_channel(ch.id, b).unwrap();
    let root = db.create_message(ch.id, a, "M1", &[]).unwrap();
    let reply = db.create_reply(root.id, b, "R1", &[]).unwrap();
    let (_, reaction) = db.add_reaction(root.id, b, "fire").unwrap();
    db.leave_channel(ch.id, b).unwrap();

    assert!(matches!(db.get_message(root.id, b), Err(StoreError::NotMember)));
    assert!(matches!(db.get_reaction(reaction.id, b), Err(StoreError::NotMember)));
    assert!(matches!(db.add_reaction(root.id, b, "eyes"), Err(StoreError::NotMember)));

    assert_eq!(db.edit_message(reply.id, b, "R1 (edited)").unwrap().content, "R1 (edited)");
    db.delete_message(reply.id, b).unwrap();

    let parent = db.get_live_message(root.id).unwrap().unwrap();
    assert_eq!(parent.reply_count, 0);
    assert!(db.get_live_message(reply.id).unwrap().is_none());
}
