//! Built-in expense categorization prompt and its few-shot pairs.

use crate::domain::model::{ExpenseCategory, ExpenseClassification, ExpenseItem};
use rust_decimal::Decimal;

/// Variables every expense prompt must declare.
pub const EXPENSE_VARIABLES: [&str; 4] = ["product_name", "unit_price", "quantity", "order_date"];

pub const EXPENSE_CATEGORIZATION_PROMPT: &str = r#"
You are an expert AI assistant specialized in US tax law concerning business expense deductions for Limited Liability Companies (LLCs).
Your primary task is to analyze potential business expenses, categorize them accurately, and determine their likely tax deductibility based on IRS guidelines.

**Core Principle:** For an expense to be deductible by a US LLC, it must be both **ordinary** AND **necessary** for carrying on the trade or business.
* **Ordinary:** Common and accepted in the LLC's specific trade or business.
* **Necessary:** Helpful and appropriate for the business. It doesn't have to be indispensable.

**Context for Analysis:**
* The expense details provided are for a US-based LLC.
* Assume the expense was incurred with a *potential* business purpose, BUT critically evaluate if the item itself suggests a **personal use** component or seems unrelated to common business activities.
* The expense must be **directly related** to the LLC's business activities. Expenses with a significant personal element are generally non-deductible or require allocation (which is outside this scope - mark as false if predominantly personal).
* Consider the **reasonableness** of the expense, although precise judgment is difficult without full context. Clearly excessive costs might be questioned by the IRS.

**Expense Details to Analyze:**
- Product Name: {product_name}
- Unit Price: {unit_price}
- Quantity: {quantity}
- Order Date: {order_date}

**Instructions:**

1.  **Analyze the Product/Service:** Based on the `product_name`, `unit_price`, and `quantity`, assess its likely use within a business context.
2.  **Categorize:** Assign the expense to *one* of the following standard business categories. If an item could fit multiple, choose the most specific or primary use. Use the category name exactly as written, without the text in parentheses.
    * Office Supplies & Software
    * Computer Hardware & Equipment
    * Professional Development & Education (Must relate to maintaining/improving skills for the *current* business)
    * Marketing & Advertising
    * Travel (Transportation, Lodging - must be away from tax home overnight for lodging)
    * Business Meals (Subject to limitations, often 50% deductible, but mark `true` if a valid business meal occurred)
    * Utilities (For business property/home office)
    * Rent & Lease (For business property)
    * Subscriptions & Dues (Business-related publications, professional organizations)
    * Cost of Goods Sold (COGS) - Items for resale or direct materials/labor in producing goods/services for sale.
    * Repairs & Maintenance (For business property/equipment)
    * Insurance (Business-related policies)
    * Professional Services (Legal, Accounting, Consulting fees)
    * Bank Fees & Charges
    * Business Interest Expense
    * Taxes & Licenses (Business-related, not federal income tax)
    * Other Business Expense (Use sparingly for valid business costs not fitting elsewhere)
    * Potentially Personal / Non-Deductible (Items primarily for personal benefit, entertainment, commuting, certain clothing, political contributions, etc.)
3.  **Determine Deductibility (`is_deductible`):**
    * Set to `true` if the expense appears **ordinary and necessary** for the LLC's business based *solely* on the provided details and general business knowledge.
    * Set to `false` if the expense:
        * Seems primarily **personal** in nature (e.g., groceries, everyday clothing, personal hobbies, entertainment).
        * Is explicitly **non-deductible** by IRS rules (e.g., most entertainment expenses, political contributions, fines/penalties).
        * Is highly **ambiguous**, and a clear business connection isn't apparent from the product name (err on the side of caution).
        * Relates to starting a business but incurred *before* the business officially started operations (these are often capitalized startup costs, not immediate deductions - mark false for this initial pass).
4.  **Justify:** Provide a concise explanation for your category choice and deductibility assessment. Reference the "ordinary and necessary" standard and mention any specific considerations (e.g., "Likely deductible as software necessary for operations," or "Potentially personal, clothing not specific workwear, marked non-deductible"). Mention potential limitations like the 50% meal rule if applicable but keep the boolean based on whether it's a *qualifying* business expense at all.

**Output Format:**
Return your response ONLY as a valid JSON object with the following keys:
- "category": string (The determined expense category)
- "is_deductible": boolean (true or false based on the analysis above)
- "justification": string (Your brief reasoning connecting the item to business deductibility rules)

**Example 1 Input Expense:**
Product Name: Business Lunch Meeting with Client XYZ
Unit Price: 85.50
Quantity: 1
Order Date: 2024-03-10

**Example 1 JSON Output:**
{{
  "category": "Business Meals",
  "is_deductible": true,
  "justification": "Business meal with a client is ordinary and necessary for maintaining business relationships. Note: Typically subject to 50% limitation on deduction amount."
}}

**Example 2 Input Expense:**
Product Name: Adobe Creative Cloud Annual Plan
Unit Price: 659.88
Quantity: 1
Order Date: 2024-01-15

**Example 2 JSON Output:**
{{
  "category": "Office Supplies & Software",
  "is_deductible": true,
  "justification": "Design software used to produce client deliverables is ordinary and necessary for operations."
}}

**Example 3 Input Expense:**
Product Name: Dell Latitude 5440 Laptop
Unit Price: 1249.00
Quantity: 1
Order Date: 2024-02-02

**Example 3 JSON Output:**
{{
  "category": "Computer Hardware & Equipment",
  "is_deductible": true,
  "justification": "A work laptop is ordinary and necessary equipment for running the business. May need to be depreciated or expensed under Section 179."
}}

**Example 4 Input Expense:**
Product Name: Levi's 501 Men's Jeans
Unit Price: 59.99
Quantity: 2
Order Date: 2024-05-12

**Example 4 JSON Output:**
{{
  "category": "Potentially Personal / Non-Deductible",
  "is_deductible": false,
  "justification": "Everyday clothing suitable for personal wear is not a deductible business expense, marked non-deductible."
}}

**Example 5 Input Expense:**
Product Name: Amazon Gift Card
Unit Price: 100.00
Quantity: 3
Order Date: 2024-06-20

**Example 5 JSON Output:**
{{
  "category": "Potentially Personal / Non-Deductible",
  "is_deductible": false,
  "justification": "No clear business connection is apparent from the product name; ambiguous items are marked non-deductible out of caution."
}}
"#;

/// A documented input/output pair embedded in the prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct FewShotExample {
    pub item: ExpenseItem,
    pub expected: ExpenseClassification,
}

/// 與 prompt 內範例一一對應
pub fn few_shot_examples() -> Vec<FewShotExample> {
    vec![
        FewShotExample {
            item: ExpenseItem::new(
                "Business Lunch Meeting with Client XYZ",
                Decimal::new(8550, 2),
                1,
                "2024-03-10",
            ),
            expected: ExpenseClassification::new(
                ExpenseCategory::BusinessMeals,
                true,
                "Business meal with a client is ordinary and necessary for maintaining business relationships. Note: Typically subject to 50% limitation on deduction amount.",
            ),
        },
        FewShotExample {
            item: ExpenseItem::new(
                "Adobe Creative Cloud Annual Plan",
                Decimal::new(65988, 2),
                1,
                "2024-01-15",
            ),
            expected: ExpenseClassification::new(
                ExpenseCategory::OfficeSuppliesSoftware,
                true,
                "Design software used to produce client deliverables is ordinary and necessary for operations.",
            ),
        },
        FewShotExample {
            item: ExpenseItem::new(
                "Dell Latitude 5440 Laptop",
                Decimal::new(124900, 2),
                1,
                "2024-02-02",
            ),
            expected: ExpenseClassification::new(
                ExpenseCategory::ComputerHardwareEquipment,
                true,
                "A work laptop is ordinary and necessary equipment for running the business. May need to be depreciated or expensed under Section 179.",
            ),
        },
        FewShotExample {
            item: ExpenseItem::new("Levi's 501 Men's Jeans", Decimal::new(5999, 2), 2, "2024-05-12"),
            expected: ExpenseClassification::new(
                ExpenseCategory::PotentiallyPersonal,
                false,
                "Everyday clothing suitable for personal wear is not a deductible business expense, marked non-deductible.",
            ),
        },
        FewShotExample {
            item: ExpenseItem::new("Amazon Gift Card", Decimal::new(10000, 2), 3, "2024-06-20"),
            expected: ExpenseClassification::new(
                ExpenseCategory::PotentiallyPersonal,
                false,
                "No clear business connection is apparent from the product name; ambiguous items are marked non-deductible out of caution.",
            ),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::response::parse_classification;
    use crate::prompt::PromptTemplate;

    #[test]
    fn test_every_few_shot_pair_is_in_the_template() {
        let template = PromptTemplate::default_expense().unwrap();
        // 雙括號渲染後才是合法 JSON
        let rendered = template
            .render(&PromptTemplate::expense_vars(&few_shot_examples()[0].item))
            .unwrap();

        for (i, example) in few_shot_examples().iter().enumerate() {
            let n = i + 1;
            assert!(rendered.contains(&format!(
                "**Example {} Input Expense:**\nProduct Name: {}\nUnit Price: {}\nQuantity: {}\nOrder Date: {}",
                n,
                example.item.product_name,
                example.item.unit_price,
                example.item.quantity,
                example.item.order_date
            )));

            let marker = format!("**Example {} JSON Output:**\n", n);
            let start = rendered.find(&marker).unwrap() + marker.len();
            let end = start + rendered[start..].find("\n}").unwrap() + 2;
            let parsed = parse_classification(&rendered[start..end], true).unwrap();
            assert_eq!(parsed, example.expected, "example {}", n);
        }
    }

    #[test]
    fn test_few_shot_pairs_default_to_false_when_personal_or_ambiguous() {
        let examples = few_shot_examples();
        assert_eq!(examples.len(), 5);
        for example in &examples {
            if example.expected.category == ExpenseCategory::PotentiallyPersonal {
                assert!(!example.expected.is_deductible);
            }
        }
        assert_eq!(examples.iter().filter(|e| e.expected.is_deductible).count(), 3);
    }

    #[test]
    fn test_prompt_lists_every_category() {
        for category in ExpenseCategory::ALL {
            assert!(
                EXPENSE_CATEGORIZATION_PROMPT.contains(&format!("* {}", category.label())),
                "missing {}",
                category.label()
            );
        }
    }
}
