//! Transactional email bodies.

use super::OutgoingMail;

/// Escape text for interpolation into HTML
fn esc(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn mail(to: &str, subject: &str, html: String, text: String) -> OutgoingMail {
    OutgoingMail {
        to: to.to_string(),
        subject: subject.to_string(),
        html,
        text,
    }
}

pub fn verify_signup(to: &str, name: &str, verify_url: &str) -> OutgoingMail {
    mail(
        to,
        "Verify your signup",
        format!(
            "<p>Hi {},</p><p>Welcome to the game! Confirm your signup to join:</p>\
             <p><a href=\"{url}\">{url}</a></p>",
            esc(name),
            url = esc(verify_url)
        ),
        format!("Hi {}\nVerify link: {}", name, verify_url),
    )
}

pub fn round_links(to: &str, name: &str, target_url: &str, report_url: &str) -> OutgoingMail {
    mail(
        to,
        "Your Assassin Game links",
        format!(
            "<p>Hi {},</p>\
             <p>Your target link: <a href=\"{t}\">{t}</a></p>\
             <p>Your report link: <a href=\"{r}\">{r}</a></p>\
             <p>Keep them secret. Good luck!</p>",
            esc(name),
            t = esc(target_url),
            r = esc(report_url)
        ),
        format!("Hi {}\nTarget: {}\nReport: {}", name, target_url, report_url),
    )
}

pub fn elimination_pending(
    to: &str,
    target_name: &str,
    hunter_name: &str,
    confirm_url: &str,
    dispute_url: &str,
    minutes: i64,
) -> OutgoingMail {
    mail(
        to,
        &format!("Elimination pending: respond within {} minutes", minutes),
        format!(
            "<p>Hi {},</p>\
             <p>Your opponent <strong>{}</strong> reported that you were eliminated.</p>\
             <p>Please choose one within {} minutes:</p>\
             <p><a href=\"{}\">Yes, I'm eliminated</a> | <a href=\"{}\">This was a mistake</a></p>\
             <p>If you do nothing, the system will auto-confirm after {} minutes.</p>",
            esc(target_name),
            esc(hunter_name),
            minutes,
            esc(confirm_url),
            esc(dispute_url),
            minutes
        ),
        format!(
            "Hi {}\nYour opponent {} reported that you were eliminated.\n\n\
             Yes, I'm eliminated: {}\nThis was a mistake: {}\n\n\
             If you do nothing, the system will auto-confirm after {} minutes.",
            target_name, hunter_name, confirm_url, dispute_url, minutes
        ),
    )
}

pub fn next_target(
    to: &str,
    hunter_name: &str,
    eliminated_name: &str,
    target_url: &str,
    report_url: &str,
    auto_approved: bool,
) -> OutgoingMail {
    let (subject, how) = if auto_approved {
        ("Next target assigned (auto-approved)", "auto-confirmed")
    } else {
        ("Next target assigned", "confirmed")
    };
    mail(
        to,
        subject,
        format!(
            "<p>Hi {},</p>\
             <p>Your elimination of <strong>{}</strong> was {}.</p>\
             <p><a href=\"{}\">View your new target</a></p>\
             <p><a href=\"{}\">Report an elimination</a></p>",
            esc(hunter_name),
            esc(eliminated_name),
            how,
            esc(target_url),
            esc(report_url)
        ),
        format!(
            "Hi {}\nYour elimination of {} was {}.\nView your new target: {}\nReport an elimination: {}\n",
            hunter_name, eliminated_name, how, target_url, report_url
        ),
    )
}

pub fn game_over(to: &str, name: &str, is_winner: bool) -> OutgoingMail {
    let line = if is_winner {
        "Congratulations, you are the last survivor!"
    } else {
        "Thanks for playing!"
    };
    mail(
        to,
        "The game has ended",
        format!(
            "<p>Hi {},</p><p>The Assassin game is now over.</p><p><strong>{}</strong></p>",
            esc(name),
            line
        ),
        format!("Hi {}\nThe Assassin game is now over.\n{}", name, line),
    )
}

pub fn dispute_admin(to: &str, hunter_name: &str, target_name: &str) -> OutgoingMail {
    mail(
        to,
        "Elimination dispute",
        format!(
            "<p>Dispute opened between <strong>{}</strong> and <strong>{}</strong>.</p>",
            esc(hunter_name),
            esc(target_name)
        ),
        format!(
            "Dispute opened between {} and {}.",
            hunter_name, target_name
        ),
    )
}

pub fn dispute_hunter(
    to: &str,
    hunter_name: &str,
    target_name: &str,
    report_url: &str,
) -> OutgoingMail {
    mail(
        to,
        "Your elimination report was disputed",
        format!(
            "<p>Hi {},</p>\
             <p>Your target <strong>{}</strong> disputed the elimination. Please resolve it together.</p>\
             <p>If they were not eliminated, keep playing. If they were, \
             <a href=\"{}\">submit the report again</a> and ask them to accept.</p>",
            esc(hunter_name),
            esc(target_name),
            esc(report_url)
        ),
        format!(
            "Hi {}\nYour target {} disputed the elimination. Please resolve it together.\n\
             Report again: {}",
            hunter_name, target_name, report_url
        ),
    )
}

pub fn status_update(to: &str, name: &str, eliminated: usize, remaining: usize) -> OutgoingMail {
    mail(
        to,
        "Game update",
        format!(
            "<p>Hi {},</p><p>An update from the game:</p>\
             <ul><li>Players eliminated so far: <strong>{}</strong></li>\
             <li>Players remaining: <strong>{}</strong></li></ul><p>Good luck!</p>",
            esc(name),
            eliminated,
            remaining
        ),
        format!(
            "Hi {}\nAn update from the game:\n- Players eliminated so far: {}\n- Players remaining: {}\nGood luck!",
            name, eliminated, remaining
        ),
    )
}
