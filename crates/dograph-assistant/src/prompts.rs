//! Prompt templates.
//!
//! Placeholders are `{name}` and are substituted by [`fill`]; values are
//! inserted verbatim.

pub const ROUTER_PROMPT: &str = r#"You are an intelligent routing assistant responsible for determining whether a question should be answered using the knowledge graph.

Current question: {question}

Please follow the rules below to decide:
1. If the question **does not contain** "This is a general question" and is clearly related to knowledge graph content (e.g., it contains words like process, operation, resource, predecessor), respond with **"graph"**.
2. If the question is **not related to the knowledge graph** (e.g., it contains words like design, scheme, generate, analyze, check), respond with **"general"**.
3. If the question **contains** the phrase "This is a general question", always respond with **"general"**, regardless of other content.
4. If you are unsure, respond with **"graph"**.

Only respond with **"graph"** or **"general"**. Do not add any other content."#;

pub const CYPHER_GENERATION_PROMPT: &str = r#"Task: Generate a Cypher statement to query a graph database.
Instructions:
Use only the provided node labels, relationship types and properties in the schema.
Do not use any other relationship types or properties that are not provided.
Return at most {top_k} rows.
Schema:
{schema}
Note: Do not include any explanations or apologies in your responses.
Do not respond to any questions that might ask anything else than for you to construct a Cypher statement.
Do not include any text except the generated Cypher statement.

The question is:
{question}"#;

pub const GRAPH_RESPONSE_PROMPT: &str = r#"You are a professional assistant for answering questions about aircraft fuselage assembly using knowledge graph results. All query results are directly retrieved from the knowledge graph and are accurate and structured.

Your goal is to help users understand the dependencies and semantics of aircraft assembly operations, based solely on the given data.

Current question: {question}

Cypher query executed: {cypher}

Query results from the knowledge graph: {graph_data}

Instructions:
1. Carefully analyze the query result and extract only the relevant information needed to answer the current question.
2. Present the answer clearly in **a structured list format**, making it easy to understand the relationships or dependencies.
3. If the question involves sequences (such as operation dependencies), emphasize **precedence relationships** and explain them.
4. Do not include or infer any information that is not directly present in the knowledge graph result.
5. Do not omit any values in graph data."#;

pub const GENERAL_QA_PROMPT: &str = r#"**Role**: Aircraft Assembly Planning Expert
**Task**: You are an expert in aircraft fuselage assembly planning. Your task is to generate a complete and feasible assembly scheme based only on the conversation history and current question.

Conversation history: {history}

Current question: {question}

**Process Requirements**:
Phase 1. **Data Extraction**
- Extract ALL operations and resources from conversation history, show them as a table
1. For each operation, document:
▪ Type (Manual/Automatic)
▪ Duration (min)
▪ Required Resources (name (number))
▪ Immediate Predecessors
2. For each resource, document:
▪ Cost (€/h)
▪ Calendar
▪ Quantity

Phase 2. **Constraint Analysis**
- Analysis specific constraints
- Analysis automatic and manual quarter aircraft fuselage assembly logic
- List the sequence chains of operations required to complete one automatic 1/4 body assembly
- List the sequence chains of operations required to complete one manual 1/4 body assembly

Phase 3. **Scheme Generation**
- Generate a complete aircraft fuselage assembly scheme following the output format, including the assembly of four quarter-fuselages.
- The generated scheme must meet the following requirements:
▪ Only the same manual operations can be carried out in parallel
▪ Automatic operations cannot be carried out in parallel with any other operations
- Output Format:
| Order | Operation | Type | Required Resources | Duration | Start Time | End Time | Parallel Group |
|-------|-----------|------|--------------------|----------|------------|----------|----------------|
Note:
▪ Order: Use a single number (1, 2, 3, ...) if it is executed sequentially
▪ Order: Use number + letter suffix (4a, 4b) if it is executed in parallel
▪ Parallel Group: Use letter suffix (a, b)
▪ This plan must include the assembly of four quarter-fuselages.
▪ You must generate a complete list of scheme without any form of omission

Phase 4. **Validation Report**:
- Check if the following conditions are met. Mark ✓ if met, and ✗ if not met.
▪ [✓/✗] Completed 4 assemblies of 1/4 body
▪ [✓/✗] Automatic operations are executed sequentially
▪ [✓/✗] No manual/auto overlap
▪ [✓/✗] Shared steps correctly positioned
▪ [✓/✗] Resource limits maintained
- If any of the conditions is not met, re-execute phase 3."#;

pub const PLAN_QUESTION: &str = r#"This is a general question. Please help me design a complete aircraft fuselage assembly scheme that includes the assembly of four 1/4 bodies, using both automatic and manual methods. Your plan should follow these specific constraints:

1. The first two operations must be "S40_00001_Jig in" and "S40_01001_Set up working environment", and the last operation must be "S40_00002_Jig out". They only need to be executed once during the whole assembly scheme.
2. "S40_04012_Deburring int, positioning, attach them automatic" (automatic) or "S40_04013_Deburring int, positioning, attach them manual" (manual) marks the completion of one 1/4 aircraft fuselage assembly. You must include a total of four such operations to complete the assembly of the entire aircraft fuselage.
3. Automatic assembly operations can only be performed in series, and only one 1/4 body can be automatically assembled at a time. However, manual assembly can be done in series or parallel. At most two sets of manual operations can be carried out in parallel.
4. Manual and automatic operations cannot be carried out in parallel.
5. Only the same manual operations can be carried out in parallel. Different manual operations cannot be carried out in parallel due to their explicit front-back dependencies.
6. Following "S40_04014_Deinstall LFT and rails", must execute: "S40_02002_Cleanup and add sealant" and "S40_02003_Inspection".
7. If multiple 1/4 bodies are manually assembled in series or parallel, it only needs to execute "S40_02002_Cleanup and add sealant" and "S40_02003_Inspection" at the final completion.
8. If multiple 1/4 bodies are automatically assembled in series, only one execution of "S40_02001_Set in position Rails and LFT" is required. When multiple 1/4 bodies are assembled, the final execution of "S40_04014-Deinstall LFT and rails" is needed.
9. Each operation depends on preceding operations, which must be completed first. These dependencies are detailed in the conversation history. Your operation sequence must strictly obey all these dependencies.

Use the conversation history to determine the full list of operations, their types, durations, resources, and dependencies. Present your scheme in a table format, include parallel labels (a, b, c) where appropriate, and calculate the total time and cost. Finally, verify that all constraints have been fully met."#;

/// Canned questions offered by the chat front end.
pub const EXAMPLE_QUESTIONS: &[(&str, &str)] = &[
    ("Process", "List the subprocess of each process."),
    (
        "Operation",
        "List all information of operations. Merge information according to manual and automatic.",
    ),
    ("Resource", "List all information of resources."),
    (
        "Required resource",
        "Search all relationships between operations and resources. List all names of operations, names of resources, and number of need resources. Merge information according to the operation.",
    ),
    ("Predecessor", "List all predecessors of each operation."),
    ("Plan", PLAN_QUESTION),
    (
        "Check",
        "This is a general question: check whether the generated automatic and manual schemes meet the predecessor requirements between operations. If not, please regenerate.",
    ),
];

/// Substitute `{key}` placeholders. Unknown placeholders are left untouched.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let substituted = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| (close, *v))
        });
        match substituted {
            Some((close, value)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
