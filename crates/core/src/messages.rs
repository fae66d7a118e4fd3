//! Message text posted into job channels. Links use Slack's `<url|label>` markup.

use crate::job::JobNumber;

pub const FINAL_MESSAGE_PREFIX: &str = "\u{2705}";

pub fn form_link(form_base: &str, job_number: &JobNumber) -> String {
    format!("{form_base}{}", urlencoding::encode(job_number.as_str()))
}

pub fn initial_form_message(form_base: &str, job_number: &JobNumber) -> String {
    let link = form_link(form_base, job_number);
    format!(
        "\u{1f4e6} Please fill out the *Contents Initial Form* for *{job_number}*:\n<{link}|Contents Initial Form>"
    )
}

pub fn progress_form_message(form_base: &str, job_number: &JobNumber) -> String {
    let link = form_link(form_base, job_number);
    format!(
        "\u{1f4cb} Please complete the *Contents Progress Form* for *{job_number}*:\n<{link}|Progress Form>"
    )
}

pub fn final_message(message: &str) -> String {
    format!("{FINAL_MESSAGE_PREFIX} {message}")
}

#[cfg(test)]
mod tests {
    use super::{final_message, form_link, initial_form_message, progress_form_message};
    use crate::job::JobNumber;

    const BASE: &str = "https://forms.example.com/viewform?usp=pp_url&entry.1=";

    #[test]
    fn initial_form_embeds_job_number_twice() {
        let text = initial_form_message(BASE, &JobNumber::new("danica-deal107"));

        assert_eq!(
            text,
            "\u{1f4e6} Please fill out the *Contents Initial Form* for *danica-deal107*:\n\
             <https://forms.example.com/viewform?usp=pp_url&entry.1=danica-deal107|Contents Initial Form>"
        );
    }

    #[test]
    fn form_link_encodes_job_number() {
        let link = form_link(BASE, &JobNumber::new("deal 7&x"));
        assert!(link.ends_with("entry.1=deal%207%26x"));
    }

    #[test]
    fn progress_form_keeps_original_case_in_text() {
        let text = progress_form_message(BASE, &JobNumber::new("Deal107"));

        assert!(text.starts_with("\u{1f4cb} Please complete the *Contents Progress Form* for *Deal107*"));
        assert!(text.ends_with("entry.1=Deal107|Progress Form>"));
    }

    #[test]
    fn final_message_gets_checkmark_prefix() {
        assert_eq!(final_message("Packing complete"), "\u{2705} Packing complete");
    }
}
