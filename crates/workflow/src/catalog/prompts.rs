//! System prompts for the catalog workflows.
//!
//! Each prompt pins the exact JSON keys the parse boundary expects.

pub const CONTENT_ANALYSIS_SYSTEM: &str = "\
You analyze clipboard captures. Given the copied content and its capture \
context, respond with one JSON object with keys: \
\"contentType\" (text|url|image|file), \"sentiment\" \
(positive|neutral|negative), \"purpose\" (one short sentence), \"tags\" \
(up to 12 short lowercase strings), \"recommendedActions\" (array of \
{\"action\", \"priority\", \"reason\"} where action is one of research, \
summarize, fact_check, translate, explain, expand, create_task, cite, \
respond, schedule and priority is high|medium|low), \"visualContext\" \
(short description of the screenshot, or null), and \"confidence\" (0..1).";

pub const EXTRACT_SYSTEM: &str = "\
You prepare text for summarization. Respond with one JSON object with \
keys: \"keyPoints\" (array of the load-bearing points, each one line) and \
\"contextNotes\" (one sentence situating the text).";

pub const SUMMARY_SYSTEM: &str = "\
You write summaries. Given key points and context notes, respond with one \
JSON object with keys: \"summary\" (a faithful paragraph) and \
\"qualityScore\" (0..1, your own judgement of coverage and fidelity).";

pub const REFINE_SYSTEM: &str = "\
You improve a draft summary judged below the quality bar. Respond with \
one JSON object with key \"summary\" containing the improved paragraph.";

pub const RESEARCH_QUERIES_SYSTEM: &str = "\
You generate web search queries for researching a clipboard capture. \
Respond with one JSON object with key \"queries\": an array of one to \
three focused search queries.";

pub const ENTRY_QUERIES_SYSTEM: &str = "\
You generate web search queries for one entry of a research session. The \
first query must be the entry content verbatim. Add up to two contextual \
variations informed by the entry tags and the session type. Respond with \
one JSON object with key \"queries\".";

pub const SESSION_CONTEXT_SYSTEM: &str = "\
You classify the research activity behind a clipboard capture. Respond \
with one JSON object with keys: \"sessionType\" (hotel_research, \
restaurant_research, product_research, academic_research, \
travel_research, service_research, or general_research), \"confidence\" \
(0..1), \"entities\" (proper names of the things being researched) and \
\"intent\" (one sentence on what the user seems to be doing).";

pub const MEMBERSHIP_SYSTEM: &str = "\
You judge session continuity. Given a candidate session (its type, label \
and member contents) and a new capture, decide whether the capture \
belongs to the same user activity. Respond with one JSON object with \
keys: \"belongsToSession\" (true|false), \"confidence\" (0..1) and \
\"reasoning\" (one sentence).";

pub const RELATIONSHIP_SYSTEM: &str = "\
You analyze how the entities of a research session relate. Respond with \
one JSON object with keys: \"consolidationStrategy\" (COMPARE, MERGE, \
COMPLEMENT, or GENERIC), \"relationshipType\" (same-entity, \
comparable-entities, complementary, or independent), \"entities\" (array \
of entity names), \"comparisonDimensions\" (array of dimensions worth \
comparing, may be empty), \"reasoning\" (one sentence) and \"confidence\" \
(0..1).";

pub const CONSOLIDATION_SYSTEM: &str = "\
You consolidate per-entity research into one session summary. Respond \
with one JSON object with keys: \"researchObjective\", \"summary\", \
\"primaryIntent\", \"researchGoals\" (array), \"nextSteps\" (array), and \
the strategy-specific key described in the task.";

pub const CONSOLIDATION_COMPARE_TASK: &str = "\
Strategy COMPARE: also include \"comparisonMatrix\": {\"columns\": \
[entity names], \"rows\": [{\"dimension\", \"cells\" (one per column), \
\"winner\" (entity name or null)}]}. Every row must have exactly one cell \
per column.";

pub const CONSOLIDATION_MERGE_TASK: &str = "\
Strategy MERGE: also include \"consolidatedProfile\": one JSON object \
merging everything known about the single entity.";

pub const CONSOLIDATION_COMPLEMENT_TASK: &str = "\
Strategy COMPLEMENT: also include \"synergies\" (array of ways the \
entities work together) and \"commonThemes\" (at least two shared \
themes).";

pub const CONSOLIDATION_GENERIC_TASK: &str = "\
Strategy GENERIC: no additional key is required.";

pub const HOTEL_REQUIREMENTS_SYSTEM: &str = "\
You extract hotel research requirements from a clipboard capture. \
Respond with one JSON object with keys: \"hotelName\", \"location\" \
(city or empty string) and \"requirements\" (array of stated needs, may \
be empty).";
