diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Varchar,
        password_hash -> Text,
        role -> Varchar,
        skills -> Array<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        title -> Varchar,
        description -> Text,
        status -> Varchar,
        created_by -> Uuid,
        assigned_to -> Nullable<Uuid>,
        deadline -> Nullable<Timestamptz>,
        summary -> Nullable<Text>,
        priority -> Nullable<Varchar>,
        helpful_notes -> Nullable<Text>,
        related_skills -> Array<Text>,
        triaged_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(users, tickets);
