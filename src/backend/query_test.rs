use super::*;

#[test]
fn table_names_match_backend_tables() {
    assert_eq!(Table::Profiles.as_str(), "profiles");
    assert_eq!(Table::Events.as_str(), "events");
    assert_eq!(Table::EventParticipants.as_str(), "event_participants");
}

#[test]
fn default_select_is_star() {
    let q = Select::table(Table::Events);
    assert_eq!(q.select_expr(), "*");
    assert_eq!(q.query_params(), vec![("select".to_owned(), "*".to_owned())]);
    assert!(!q.single);
}

#[test]
fn events_query_orders_by_start_date() {
    let q = Select::table(Table::Events).order("start_date", Direction::Ascending);
    let params = q.query_params();
    assert_eq!(params[1], ("order".to_owned(), "start_date.asc".to_owned()));
}

#[test]
fn participants_query_embeds_profile_fields() {
    let q = Select::table(Table::EventParticipants)
        .embed(Table::Profiles, "user_id", &["full_name", "email"])
        .eq("event_id", "abc");
    assert_eq!(q.select_expr(), "*,profiles(full_name,email)");
    assert_eq!(
        q.query_params(),
        vec![
            ("select".to_owned(), "*,profiles(full_name,email)".to_owned()),
            ("event_id".to_owned(), "eq.abc".to_owned()),
        ]
    );
}

#[test]
fn role_query_projects_single_column() {
    let q = Select::table(Table::Profiles).columns(&["role"]).eq("id", 7).single();
    assert_eq!(q.select_expr(), "role");
    assert!(q.single);
    assert_eq!(q.filters, vec![("id".to_owned(), "7".to_owned())]);
}

#[test]
fn descending_order_renders_desc() {
    let q = Select::table(Table::EventParticipants).order("registered_at", Direction::Descending);
    assert_eq!(q.query_params().last().unwrap().1, "registered_at.desc");
}
