use super::*;

#[test]
fn six_recognised_tokens_select_distinct_routes() {
    let routes: Vec<Route> = ["/", "/articles", "/article?id=7", "/admin", "/login", "/signup"]
        .into_iter()
        .map(|token| Route::parse(token).expect(token))
        .collect();
    assert_eq!(
        routes,
        vec![
            Route::Home,
            Route::Articles { category: None },
            Route::Article { id: ArticleId(7) },
            Route::Admin,
            Route::Login,
            Route::Signup,
        ]
    );
}

#[test]
fn unrecognised_tokens_select_nothing() {
    for token in ["/about", "/admin/users", "/article", "/article?id=abc", "//elsewhere/admin"] {
        assert_eq!(Route::parse(token), None, "{token}");
    }
}

#[test]
fn article_id_also_accepted_as_path_segment() {
    assert_eq!(
        Route::parse("/article/12"),
        Some(Route::Article { id: ArticleId(12) })
    );
}

#[test]
fn articles_route_carries_category_filter() {
    assert_eq!(
        Route::parse("/articles?category=Sports"),
        Some(Route::Articles {
            category: Some(Category::Sports)
        })
    );
    assert_eq!(
        Route::parse("/articles?category=weather"),
        Some(Route::Articles { category: None })
    );
}

#[test]
fn display_produces_parseable_token() {
    let route = Route::Articles {
        category: Some(Category::Events),
    };
    assert_eq!(route.to_string(), "/articles?category=events");
    assert_eq!(Route::parse(&route.to_string()), Some(route));
    assert_eq!(Route::parse(""), Some(Route::Home));
}
