/// Interactive prompts.
///
/// Actions talk to the operator only through `Ask`, so flows can be driven by
/// scripted answers in tests.
use anyhow::Result;
use inquire::{Confirm, CustomType, MultiSelect, Select, Text};

pub trait Ask {
    fn confirm(&self, message: &str, default: bool) -> Result<bool>;

    fn text(&self, message: &str, default: Option<&str>) -> Result<String>;

    /// Integer input; `validate` rejects values with the returned message.
    fn number(&self, message: &str, default: i64, validate: fn(i64) -> Option<&'static str>) -> Result<i64>;

    /// Index of the chosen option.
    fn select(&self, message: &str, options: &[String]) -> Result<usize>;

    /// Indices of the chosen options, in display order.
    fn multi_select(&self, message: &str, options: &[String], all_selected: bool) -> Result<Vec<usize>>;
}

/// Terminal prompts via inquire.
#[derive(Debug, Default, Clone, Copy)]
pub struct InquireAsk;

impl Ask for InquireAsk {
    fn confirm(&self, message: &str, default: bool) -> Result<bool> {
        Ok(Confirm::new(message).with_default(default).prompt()?)
    }

    fn text(&self, message: &str, default: Option<&str>) -> Result<String> {
        let prompt = Text::new(message);
        let answer = match default {
            Some(d) => prompt.with_default(d).prompt()?,
            None => prompt.prompt()?,
        };
        Ok(answer)
    }

    fn number(&self, message: &str, default: i64, validate: fn(i64) -> Option<&'static str>) -> Result<i64> {
        let answer = CustomType::<i64>::new(message)
            .with_default(default)
            .with_error_message("Please type a whole number")
            .with_validator(move |value: &i64| {
                Ok(match validate(*value) {
                    Some(reason) => inquire::validator::Validation::Invalid(reason.into()),
                    None => inquire::validator::Validation::Valid,
                })
            })
            .prompt()?;
        Ok(answer)
    }

    fn select(&self, message: &str, options: &[String]) -> Result<usize> {
        let answer = Select::new(message, options.to_vec()).raw_prompt()?;
        Ok(answer.index)
    }

    fn multi_select(&self, message: &str, options: &[String], all_selected: bool) -> Result<Vec<usize>> {
        let prompt = MultiSelect::new(message, options.to_vec());
        let prompt = if all_selected {
            prompt.with_all_selected_by_default()
        } else {
            prompt
        };
        Ok(prompt.raw_prompt()?.into_iter().map(|o| o.index).collect())
    }
}
