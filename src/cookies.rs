use actix_web::cookie::{time, Cookie, SameSite};

pub fn remove_cookie(name: &str) -> String {
    format!("{}=; expires=Thu, 01 Jan 1970 00:00:00 UTC; path=/", name)
}

pub fn cookie(name: &str, value: String, max_age_secs: u64, secure: bool) -> Cookie<'static> {
    let max_age = i64::try_from(max_age_secs).unwrap_or(i64::MAX);

    Cookie::build(name.to_owned(), value)
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(max_age))
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_cookie_attributes() {
        let c = cookie("gallery.session", "v".to_owned(), 900, true);

        assert_eq!(c.http_only(), Some(true));
        assert_eq!(c.secure(), Some(true));
        assert_eq!(c.same_site(), Some(SameSite::Lax));
        assert_eq!(c.path(), Some("/"));
        assert_eq!(c.max_age(), Some(time::Duration::seconds(900)));
    }

    #[test]
    fn removal_expires_in_the_past() {
        assert_eq!(
            remove_cookie("gallery.session"),
            "gallery.session=; expires=Thu, 01 Jan 1970 00:00:00 UTC; path=/"
        );
    }
}
