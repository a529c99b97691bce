use super::*;
use press_core::Theme;
use shared::{
    domain::{Role, UserId, UserProfile},
    protocol::Session,
};

fn signed_in(role: Role) -> SessionContext {
    let mut ctx = SessionContext::new(Theme::Light);
    ctx.session = Some(Session {
        token: "t".into(),
        user_id: UserId(1),
        email: "u1@vspress.org".into(),
        expires_at: Default::default(),
    });
    ctx.profile = Some(UserProfile {
        user_id: UserId(1),
        email: "u1@vspress.org".into(),
        display_name: "U1".into(),
        role,
        created_at: Default::default(),
    });
    ctx
}

#[test]
fn signup_keeps_spaces_in_display_name() {
    assert_eq!(
        Command::parse("signup ana@vspress.org hunter22 Ana Lopez"),
        Ok(Command::SignUp {
            email: "ana@vspress.org".into(),
            password: "hunter22".into(),
            display_name: "Ana Lopez".into(),
        })
    );
    assert_eq!(
        Command::parse("signup ana@vspress.org hunter22"),
        Err("missing name".into())
    );
}

#[test]
fn comment_takes_rest_of_line_as_text() {
    assert_eq!(
        Command::parse("comment 4   See you at the fair!"),
        Ok(Command::Comment {
            article_id: ArticleId(4),
            text: "See you at the fair!".into(),
        })
    );
}

#[test]
fn ids_must_be_numbers() {
    assert_eq!(
        Command::parse("like four"),
        Err("article must be a number".into())
    );
    assert_eq!(
        Command::parse("uncomment 4 9"),
        Ok(Command::DeleteComment {
            article_id: ArticleId(4),
            comment_id: CommentId(9),
        })
    );
}

#[test]
fn form_fields_parse() {
    assert_eq!(
        Command::parse("set category Events"),
        Ok(Command::Set(FormField::Category(Category::Events)))
    );
    assert_eq!(
        Command::parse("set featured yes"),
        Ok(Command::Set(FormField::Featured(true)))
    );
    assert!(Command::parse("set category weather").is_err());
    assert!(Command::parse("set colour red").is_err());
}

#[test]
fn unknown_verb_is_rejected() {
    assert!(Command::parse("dance").is_err());
    assert_eq!(Command::parse("  quit "), Ok(Command::Quit));
}

#[test]
fn delete_is_only_confirmed_for_admins() {
    assert_eq!(
        delete_prompt(&SessionContext::new(Theme::Light), ArticleId(7)),
        None
    );
    assert_eq!(delete_prompt(&signed_in(Role::User), ArticleId(7)), None);
    assert_eq!(
        delete_prompt(&signed_in(Role::Admin), ArticleId(7)),
        Some("Delete \"article 7\"?".to_string())
    );
}
