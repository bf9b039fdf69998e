// video metadata, one row per finalized upload
diesel::table! {
    videos (video_id) {
        video_id -> Text,
        title -> Text,
        description -> Text,
        visibility -> Text,
        user_id -> Text,
        video_url -> Text,
        thumbnail_url -> Text,
        duration -> Nullable<Integer>,
        views -> Integer,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

// owned by the auth service, read only here
diesel::table! {
    user (id) {
        id -> Text,
        name -> Text,
        image -> Nullable<Text>,
    }
}

// finalize saga log, see reconcile.rs
diesel::table! {
    upload_intents (video_id) {
        video_id -> Text,
        user_id -> Text,
        status -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(videos -> user (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    videos,
    user,
    upload_intents,
);
