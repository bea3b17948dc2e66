use itertools::Itertools;

/// Units a quantity may be expressed in. Every list prompt embeds this vocabulary.
pub const UNIT_VOCABULARY: [&str; 10] = [
    "gram",
    "kilogram",
    "milliliter",
    "liter",
    "teaspoon",
    "tablespoon",
    "cup",
    "piece",
    "clove",
    "pinch",
];

/// Context for a question asked about one cooking step.
#[derive(Debug, Clone)]
pub struct StepQuestion<'a> {
    pub dish_name: &'a str,
    pub step_title: &'a str,
    pub step_description: &'a str,
    pub question: &'a str,
}

/// Prompt sent alongside the dish photo.
pub fn identify_dish_prompt() -> String {
    include_str!("../../prompts/identify.md").to_string()
}

pub fn ingredient_list_prompt(dish_name: &str) -> String {
    include_str!("../../prompts/ingredients.md")
        .replace("{dish}", dish_name)
        .replace("{units}", &UNIT_VOCABULARY.join(", "))
}

pub fn tool_list_prompt(dish_name: &str) -> String {
    include_str!("../../prompts/tools.md")
        .replace("{dish}", dish_name)
        .replace("{units}", &UNIT_VOCABULARY.join(", "))
}

/// Cooking steps restricted to the ingredients already generated for the dish.
pub fn instructions_prompt(dish_name: &str, ingredient_names: &[String]) -> String {
    let ingredients = ingredient_names
        .iter()
        .map(|name| format!("- {name}"))
        .join("\n");
    include_str!("../../prompts/instructions.md")
        .replace("{dish}", dish_name)
        .replace("{ingredients}", &ingredients)
}

pub fn step_question_prompt(context: &StepQuestion) -> String {
    include_str!("../../prompts/step-qna.md")
        .replace("{dish}", context.dish_name)
        .replace("{step_title}", context.step_title)
        .replace("{step_description}", context.step_description)
        .replace("{question}", context.question)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_quantity_contract(prompt: &str) {
        assert!(prompt.contains("SINGLE numeric value"));
        assert!(prompt.contains("NO ranges"));
        for unit in UNIT_VOCABULARY {
            assert!(prompt.contains(unit), "missing unit {unit}");
        }
        assert!(!prompt.contains("{units}"));
        assert!(!prompt.contains("{dish}"));
    }

    #[test]
    fn test_list_prompts_carry_quantity_contract() {
        let ingredients = ingredient_list_prompt("Soto Ayam");
        assert!(ingredients.contains("\"Soto Ayam\""));
        assert_quantity_contract(&ingredients);

        let tools = tool_list_prompt("Soto Ayam");
        assert!(tools.contains("15 or more tools"));
        assert_quantity_contract(&tools);
    }

    #[test]
    fn test_instructions_prompt_lists_only_given_ingredients() {
        let prompt = instructions_prompt(
            "Soto Ayam",
            &["chicken".to_string(), "lemongrass".to_string()],
        );
        assert!(prompt.contains("making Soto Ayam"));
        assert!(prompt.contains("- chicken\n- lemongrass"));
        assert!(prompt.contains("\"time\""));
    }

    #[test]
    fn test_question_prompt_carries_context() {
        let prompt = step_question_prompt(&StepQuestion {
            dish_name: "Soto Ayam",
            step_title: "Prepare aromatics",
            step_description: "Bruise the lemongrass and slice the ginger.",
            question: "why do we bruise the lemongrass?",
        });
        assert!(prompt.contains("cook Soto Ayam"));
        assert!(prompt.contains("\"Prepare aromatics\""));
        assert!(prompt.contains("Bruise the lemongrass and slice the ginger."));
        assert!(prompt.contains("\"why do we bruise the lemongrass?\""));
    }

    #[test]
    fn test_identify_prompt_names_output_fields() {
        let prompt = identify_dish_prompt();
        assert!(prompt.contains("dish_name"));
        assert!(prompt.contains("match_percentage"));
    }
}
